use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub fallback_concepts: Vec<FallbackConcept>,
}

/// Deployment-configured last-resort concept. Used only when an attempt yields
/// incorrect answers but no concept can be resolved from any other source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConcept {
    pub name: String,
    pub description: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let log_dir = file_log_dir(
            std::env::var("ENABLE_FILE_LOGS").ok().as_deref(),
            std::env::var("LOG_DIR").ok(),
        );

        let fallback_concepts = std::env::var("FALLBACK_CONCEPTS")
            .map(|raw| parse_fallback_concepts(&raw))
            .unwrap_or_default();

        Self {
            host,
            port,
            log_level,
            log_dir,
            fallback_concepts,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// File logging is opt-in; LOG_DIR only takes effect once ENABLE_FILE_LOGS is
/// set.
fn file_log_dir(enabled: Option<&str>, dir: Option<String>) -> Option<String> {
    match enabled {
        Some("true") | Some("1") => Some(dir.unwrap_or_else(|| "./logs".to_string())),
        _ => None,
    }
}

/// Format: `name:description;name:description`. Description is optional.
pub fn parse_fallback_concepts(raw: &str) -> Vec<FallbackConcept> {
    raw.split(';')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (name, description) = match entry.split_once(':') {
                Some((name, description)) => (name.trim(), description.trim()),
                None => (entry, ""),
            };
            if name.is_empty() {
                return None;
            }
            Some(FallbackConcept {
                name: name.to_string(),
                description: description.to_string(),
            })
        })
        .collect()
}
