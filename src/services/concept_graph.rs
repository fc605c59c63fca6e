use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// An atomic unit of skill or knowledge. Concepts are append-only: there is no
/// deletion API, because proficiency records, question mappings and path nodes
/// all reference them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty_level: DifficultyLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    Intermediate,
    Expert,
}

impl DifficultyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyLevel::Beginner => "beginner",
            DifficultyLevel::Intermediate => "intermediate",
            DifficultyLevel::Expert => "expert",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "intermediate" => DifficultyLevel::Intermediate,
            "expert" => DifficultyLevel::Expert,
            _ => DifficultyLevel::Beginner,
        }
    }
}

/// Collapses runs of whitespace and trims. Concept names coming back from the
/// analysis collaborator are free text and arrive in every imaginable shape.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Idempotent lookup-by-name with lazy creation: exact case-insensitive match
/// first, then case-insensitive substring match, then insert.
pub async fn get_or_create(
    pool: &SqlitePool,
    name: &str,
    description: &str,
    difficulty: DifficultyLevel,
) -> Result<Concept, sqlx::Error> {
    let name = normalize_name(name);

    if let Some(concept) = find_by_name(pool, &name).await? {
        return Ok(concept);
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO "concepts" ("id","name","description","difficulty_level")
        VALUES (?,?,?,?)
        "#,
    )
    .bind(&id)
    .bind(&name)
    .bind(description)
    .bind(difficulty.as_str())
    .execute(pool)
    .await?;

    tracing::info!(concept = %name, "created concept");

    Ok(Concept {
        id,
        name,
        description: description.to_string(),
        difficulty_level: difficulty,
    })
}

pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Concept>, sqlx::Error> {
    let name = normalize_name(name);

    let exact = sqlx::query(
        r#"
        SELECT "id","name","description","difficulty_level"
        FROM "concepts"
        WHERE lower("name") = lower(?)
        LIMIT 1
        "#,
    )
    .bind(&name)
    .fetch_optional(pool)
    .await?;
    if let Some(row) = exact {
        return Ok(Some(map_concept_row(&row)));
    }

    // Substring fallback: a stored name containing the query wins, shortest
    // first. The reverse direction would let a short stored name absorb
    // unrelated new concepts. LIKE is case-insensitive for ASCII in SQLite.
    let fuzzy = sqlx::query(
        r#"
        SELECT "id","name","description","difficulty_level"
        FROM "concepts"
        WHERE "name" LIKE '%' || ? || '%'
        ORDER BY length("name") ASC
        LIMIT 1
        "#,
    )
    .bind(&name)
    .fetch_optional(pool)
    .await?;

    Ok(fuzzy.map(|row| map_concept_row(&row)))
}

pub async fn get_by_id(pool: &SqlitePool, concept_id: &str) -> Result<Option<Concept>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id","name","description","difficulty_level"
        FROM "concepts"
        WHERE "id" = ?
        LIMIT 1
        "#,
    )
    .bind(concept_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| map_concept_row(&row)))
}

pub async fn prerequisites_of(
    pool: &SqlitePool,
    concept_id: &str,
) -> Result<Vec<Concept>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c."id", c."name", c."description", c."difficulty_level"
        FROM "concept_prerequisites" p
        JOIN "concepts" c ON c."id" = p."prerequisite_id"
        WHERE p."concept_id" = ?
        "#,
    )
    .bind(concept_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(map_concept_row).collect())
}

/// No cycle check here: cycles are legal in storage and surface as a fatal
/// error at path-build time.
pub async fn add_prerequisite(
    pool: &SqlitePool,
    concept_id: &str,
    prerequisite_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO "concept_prerequisites" ("concept_id","prerequisite_id")
        VALUES (?,?)
        "#,
    )
    .bind(concept_id)
    .bind(prerequisite_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Prerequisite edges among the given concepts: concept_id -> prerequisite ids.
/// Edges pointing outside the set are dropped by the callers that order paths.
pub async fn prerequisite_edges(
    pool: &SqlitePool,
    concept_ids: &[String],
) -> Result<HashMap<String, Vec<String>>, sqlx::Error> {
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    if concept_ids.is_empty() {
        return Ok(edges);
    }

    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        r#"SELECT "concept_id","prerequisite_id" FROM "concept_prerequisites" WHERE "concept_id" IN ("#,
    );
    {
        let mut sep = qb.separated(", ");
        for id in concept_ids {
            sep.push_bind(id);
        }
        sep.push_unseparated(")");
    }
    let rows = qb.build().fetch_all(pool).await?;

    for row in rows {
        let concept_id: String = row.try_get("concept_id").unwrap_or_default();
        let prerequisite_id: String = row.try_get("prerequisite_id").unwrap_or_default();
        edges.entry(concept_id).or_default().push(prerequisite_id);
    }
    Ok(edges)
}

/// Explicit post-creation hook for question→concept mapping, invoked by the
/// assessment-creation workflow after the question row exists. Links concepts
/// whose names appear as words of the question text; when nothing matches,
/// links a generic concept derived from the assessment title.
pub async fn map_question_concepts(
    pool: &SqlitePool,
    question_id: &str,
) -> Result<usize, sqlx::Error> {
    let Some(row) = sqlx::query(
        r#"
        SELECT q."text" AS "text", a."title" AS "title"
        FROM "questions" q
        JOIN "assessments" a ON a."id" = q."assessment_id"
        WHERE q."id" = ?
        LIMIT 1
        "#,
    )
    .bind(question_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(0);
    };

    let text: String = row.try_get("text").unwrap_or_default();
    let title: String = row.try_get("title").unwrap_or_default();

    let keywords: HashSet<String> = text
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect();

    let mut linked = 0usize;
    for keyword in &keywords {
        let matched = sqlx::query(
            r#"SELECT "id" FROM "concepts" WHERE lower("name") = ? LIMIT 1"#,
        )
        .bind(keyword)
        .fetch_optional(pool)
        .await?;
        if let Some(row) = matched {
            let concept_id: String = row.try_get("id").unwrap_or_default();
            link_question_concept(pool, question_id, &concept_id, 1.0).await?;
            linked += 1;
        }
    }

    if linked == 0 && !title.is_empty() {
        let concept = get_or_create(
            pool,
            &title,
            &format!("Learning materials for {title}"),
            DifficultyLevel::Beginner,
        )
        .await?;
        link_question_concept(pool, question_id, &concept.id, 1.0).await?;
        linked = 1;
        tracing::info!(question = question_id, concept = %concept.name, "mapped question to generic concept");
    }

    Ok(linked)
}

pub async fn link_question_concept(
    pool: &SqlitePool,
    question_id: &str,
    concept_id: &str,
    weight: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO "question_concept_mappings" ("question_id","concept_id","weight")
        VALUES (?,?,?)
        "#,
    )
    .bind(question_id)
    .bind(concept_id)
    .bind(weight)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) fn map_concept_row(row: &sqlx::sqlite::SqliteRow) -> Concept {
    let difficulty_raw: String = row.try_get("difficulty_level").unwrap_or_default();
    Concept {
        id: row.try_get("id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        description: row.try_get("description").unwrap_or_default(),
        difficulty_level: DifficultyLevel::parse(&difficulty_raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  linear   algebra \n"), "linear algebra");
        assert_eq!(normalize_name("Calculus"), "Calculus");
    }

    #[test]
    fn test_difficulty_parse_roundtrip() {
        for level in [
            DifficultyLevel::Beginner,
            DifficultyLevel::Intermediate,
            DifficultyLevel::Expert,
        ] {
            assert_eq!(DifficultyLevel::parse(level.as_str()), level);
        }
        assert_eq!(DifficultyLevel::parse("weird"), DifficultyLevel::Beginner);
    }
}
