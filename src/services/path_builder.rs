use std::collections::{HashMap, HashSet};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::services::analyzer::WeakConcept;
use crate::services::concept_graph::{self, Concept};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Audio,
    Text,
    Interactive,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Audio => "audio",
            ContentType::Text => "text",
            ContentType::Interactive => "interactive",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "video" => ContentType::Video,
            "audio" => ContentType::Audio,
            "interactive" => ContentType::Interactive,
            _ => ContentType::Text,
        }
    }
}

/// Canonical learning-style table: visual→video, auditory→audio,
/// kinesthetic→interactive, reading→text; anything else gets text.
pub fn content_type_for_style(learning_style: &str) -> ContentType {
    match learning_style.trim().to_lowercase().as_str() {
        "visual" => ContentType::Video,
        "auditory" => ContentType::Audio,
        "kinesthetic" => ContentType::Interactive,
        _ => ContentType::Text,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub course_content_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub nodes: Vec<PathNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathNode {
    pub id: String,
    pub concept_id: String,
    pub concept_name: String,
    pub order: i64,
    pub content_type: ContentType,
    pub content_id: String,
    pub completed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("circular dependency detected in concept prerequisites near '{0}'")]
    CircularDependency(String),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Builds a fresh active learning path for (user, scope).
///
/// Deactivating prior paths, inserting the new path row and inserting its
/// nodes happen in a single transaction: there is never a moment with zero or
/// two active paths for the scope, and a cycle aborts with nothing persisted.
/// An empty weak-concept list still yields a valid empty active path.
pub async fn build_path(
    pool: &SqlitePool,
    user_id: &str,
    scope: Option<&str>,
    title: &str,
    weak_concepts: &[WeakConcept],
    learning_style: &str,
) -> Result<LearningPath, BuildError> {
    let concepts: Vec<Concept> = weak_concepts.iter().map(|w| w.concept.clone()).collect();
    let concept_ids: Vec<String> = concepts.iter().map(|c| c.id.clone()).collect();
    let edges = concept_graph::prerequisite_edges(pool, &concept_ids).await?;

    let order = topological_order(&concepts, &edges)?;
    let content_type = content_type_for_style(learning_style);
    let now = now_iso();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE "learning_paths" SET "is_active" = 0, "updated_at" = ?
        WHERE "user_id" = ? AND "course_content_id" IS ? AND "is_active" = 1
        "#,
    )
    .bind(&now)
    .bind(user_id)
    .bind(scope)
    .execute(&mut *tx)
    .await?;

    let path_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO "learning_paths" ("id","user_id","title","course_content_id","is_active","created_at","updated_at")
        VALUES (?,?,?,?,1,?,?)
        "#,
    )
    .bind(&path_id)
    .bind(user_id)
    .bind(title)
    .bind(scope)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let mut used_orders: HashSet<i64> = HashSet::new();
    let mut nodes = Vec::with_capacity(order.len());
    for idx in order {
        let concept = &concepts[idx];
        let node_order = next_free_order(&used_orders);
        let content_id = generate_content_id(&concept.id, content_type);
        let node_id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO "learning_path_nodes"
                ("id","learning_path_id","concept_id","order","content_type","content_id","completed","created_at")
            VALUES (?,?,?,?,?,?,0,?)
            "#,
        )
        .bind(&node_id)
        .bind(&path_id)
        .bind(&concept.id)
        .bind(node_order)
        .bind(content_type.as_str())
        .bind(&content_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        used_orders.insert(node_order);
        tracing::info!(path = %path_id, concept = %concept.name, order = node_order, "created path node");
        nodes.push(PathNode {
            id: node_id,
            concept_id: concept.id.clone(),
            concept_name: concept.name.clone(),
            order: node_order,
            content_type,
            content_id,
            completed: false,
        });
    }

    tx.commit().await?;
    tracing::info!(path = %path_id, user = user_id, nodes = nodes.len(), "built learning path");

    Ok(LearningPath {
        id: path_id,
        user_id: user_id.to_string(),
        title: title.to_string(),
        course_content_id: scope.map(|s| s.to_string()),
        is_active: true,
        created_at: now.clone(),
        updated_at: now,
        nodes,
    })
}

/// Depth-first topological sort with three-color marking, run iteratively over
/// an index arena so graph size never bounds the call stack. Edge A→B reads
/// "A is a prerequisite of B"; the result places every prerequisite before its
/// dependents. Prerequisites outside the input set do not participate. A gray
/// revisit is a cycle and fails the whole sort; there is no partial order.
pub fn topological_order(
    concepts: &[Concept],
    prerequisites: &HashMap<String, Vec<String>>,
) -> Result<Vec<usize>, BuildError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let index: HashMap<&str, usize> = concepts
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    let deps: Vec<Vec<usize>> = concepts
        .iter()
        .map(|c| {
            prerequisites
                .get(&c.id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| index.get(id.as_str()).copied())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let mut color = vec![Color::White; concepts.len()];
    let mut order = Vec::with_capacity(concepts.len());

    for start in 0..concepts.len() {
        if color[start] != Color::White {
            continue;
        }
        color[start] = Color::Gray;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let cursor = frame.1;
            if cursor < deps[node].len() {
                frame.1 += 1;
                let dep = deps[node][cursor];
                match color[dep] {
                    Color::Gray => {
                        return Err(BuildError::CircularDependency(
                            concepts[dep].name.clone(),
                        ));
                    }
                    Color::White => {
                        color[dep] = Color::Gray;
                        stack.push((dep, 0));
                    }
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                order.push(node);
                stack.pop();
            }
        }
    }

    Ok(order)
}

/// Smallest non-negative integer not yet taken. O(n) in the number of used
/// orders, which is fine at expected path sizes (tens of nodes).
pub fn next_free_order(used: &HashSet<i64>) -> i64 {
    let mut candidate = 0;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

/// Opaque content token: `{concept_id}_{content_type}_{random suffix}`.
pub fn generate_content_id(concept_id: &str, content_type: ContentType) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", concept_id, content_type.as_str(), &suffix[..8])
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn load_active_path(
    pool: &SqlitePool,
    user_id: &str,
    scope: Option<&str>,
) -> Result<Option<LearningPath>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id","user_id","title","course_content_id","is_active","created_at","updated_at"
        FROM "learning_paths"
        WHERE "user_id" = ? AND "course_content_id" IS ? AND "is_active" = 1
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(scope)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let path_id: String = row.try_get("id").unwrap_or_default();
    let nodes = load_path_nodes(pool, &path_id).await?;

    Ok(Some(LearningPath {
        id: path_id,
        user_id: row.try_get("user_id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        course_content_id: row.try_get::<Option<String>, _>("course_content_id").ok().flatten(),
        is_active: row.try_get::<i64, _>("is_active").unwrap_or(0) != 0,
        created_at: row.try_get("created_at").unwrap_or_default(),
        updated_at: row.try_get("updated_at").unwrap_or_default(),
        nodes,
    }))
}

pub async fn load_path_nodes(
    pool: &SqlitePool,
    path_id: &str,
) -> Result<Vec<PathNode>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT n."id", n."concept_id", c."name" AS "concept_name", n."order",
               n."content_type", n."content_id", n."completed"
        FROM "learning_path_nodes" n
        JOIN "concepts" c ON c."id" = n."concept_id"
        WHERE n."learning_path_id" = ?
        ORDER BY n."order" ASC
        "#,
    )
    .bind(path_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let content_type_raw: String = row.try_get("content_type").unwrap_or_default();
            PathNode {
                id: row.try_get("id").unwrap_or_default(),
                concept_id: row.try_get("concept_id").unwrap_or_default(),
                concept_name: row.try_get("concept_name").unwrap_or_default(),
                order: row.try_get::<i64, _>("order").unwrap_or(0),
                content_type: ContentType::parse(&content_type_raw),
                content_id: row.try_get("content_id").unwrap_or_default(),
                completed: row.try_get::<i64, _>("completed").unwrap_or(0) != 0,
            }
        })
        .collect())
}

/// A node together with its concept, scoped to the owning user.
#[derive(Debug, Clone)]
pub struct NodeDetail {
    pub node: PathNode,
    pub concept: Concept,
}

pub async fn load_node_detail(
    pool: &SqlitePool,
    node_id: &str,
    user_id: &str,
) -> Result<Option<NodeDetail>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT n."id" AS "node_id", n."concept_id", n."order", n."content_type", n."content_id", n."completed",
               c."id", c."name", c."description", c."difficulty_level"
        FROM "learning_path_nodes" n
        JOIN "learning_paths" p ON p."id" = n."learning_path_id"
        JOIN "concepts" c ON c."id" = n."concept_id"
        WHERE n."id" = ? AND p."user_id" = ?
        LIMIT 1
        "#,
    )
    .bind(node_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let content_type_raw: String = row.try_get("content_type").unwrap_or_default();
        let concept = concept_graph::map_concept_row(&row);
        NodeDetail {
            node: PathNode {
                id: row.try_get("node_id").unwrap_or_default(),
                concept_id: row.try_get("concept_id").unwrap_or_default(),
                concept_name: concept.name.clone(),
                order: row.try_get::<i64, _>("order").unwrap_or(0),
                content_type: ContentType::parse(&content_type_raw),
                content_id: row.try_get("content_id").unwrap_or_default(),
                completed: row.try_get::<i64, _>("completed").unwrap_or(0) != 0,
            },
            concept,
        }
    }))
}

/// Flips `completed` on a node owned by the user. The only mutation a node
/// ever sees after creation.
pub async fn mark_node_completed(
    pool: &SqlitePool,
    node_id: &str,
    user_id: &str,
) -> Result<Option<NodeDetail>, sqlx::Error> {
    let Some(detail) = load_node_detail(pool, node_id, user_id).await? else {
        return Ok(None);
    };

    sqlx::query(r#"UPDATE "learning_path_nodes" SET "completed" = 1 WHERE "id" = ?"#)
        .bind(node_id)
        .execute(pool)
        .await?;

    let mut detail = detail;
    detail.node.completed = true;
    Ok(Some(detail))
}
