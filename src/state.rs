use std::sync::Arc;
use std::time::Instant;

use sqlx::SqlitePool;

use crate::config::FallbackConcept;
use crate::services::analysis_provider::AnalysisService;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    pool: SqlitePool,
    analysis: Arc<AnalysisService>,
    fallback_concepts: Arc<Vec<FallbackConcept>>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        analysis: AnalysisService,
        fallback_concepts: Vec<FallbackConcept>,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            pool,
            analysis: Arc::new(analysis),
            fallback_concepts: Arc::new(fallback_concepts),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn analysis(&self) -> &AnalysisService {
        &self.analysis
    }

    pub fn fallback_concepts(&self) -> &[FallbackConcept] {
        &self.fallback_concepts
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
