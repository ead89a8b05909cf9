//! Inter-model topic comparisons.
//!
//! `compare add` takes an externally computed topics(model_0) ×
//! topics(model_1) value matrix and materializes the full dense cross
//! product of topic pairs. Downstream topic-evolution queries filter this
//! table at query time by threshold and kind, so nothing is thresholded or
//! sparsified here.
//!
//! The model pair and the edge values are immutable after creation; only
//! name, description and bounds can change. Replacing the matrix means
//! delete and re-add.

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

use crate::artifact::ComparisonMatrix;
use crate::config::Config;
use crate::db;
use crate::error::{map_unique, StoreError, StoreResult};
use crate::ingest::BIND_LIMIT;
use crate::models::ComparisonKind;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::registry::fetch_model;
use crate::slug::slugify;

/// Parameters for registering a comparison.
pub struct NewComparison {
    pub name: String,
    pub matrix_path: PathBuf,
    pub kind: ComparisonKind,
    pub model_0: String,
    pub model_1: String,
    pub description: Option<String>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

pub struct AddSummary {
    pub name: String,
    pub edges: u64,
}

pub async fn add_comparison(
    pool: &SqlitePool,
    config: &Config,
    req: NewComparison,
    reporter: &dyn ProgressReporter,
) -> StoreResult<AddSummary> {
    let name = slugify(&req.name);
    if name.is_empty() {
        return Err(StoreError::validation(
            "comparison name must contain at least one alphanumeric character",
        ));
    }
    let description = req.description.unwrap_or_else(|| req.name.clone());

    let model_0 = fetch_model(pool, &req.model_0).await?;
    let model_1 = fetch_model(pool, &req.model_1).await?;
    if model_0.id == model_1.id {
        return Err(StoreError::validation(
            "a comparison requires two distinct models",
        ));
    }

    let matrix = ComparisonMatrix::load(&req.matrix_path)?;
    let topics_0 = fetch_topic_ids(pool, &model_0.id).await?;
    let topics_1 = fetch_topic_ids(pool, &model_1.id).await?;
    if matrix.rows() != topics_0.len() || matrix.cols() != topics_1.len() {
        return Err(StoreError::validation(format!(
            "comparison matrix is {}x{} but model \"{}\" has {} topics and model \"{}\" has {}",
            matrix.rows(),
            matrix.cols(),
            model_0.name,
            topics_0.len(),
            model_1.name,
            topics_1.len(),
        )));
    }

    let total = 2 + topics_0.len() as u64;
    let mut progress = ProgressTracker::new(reporter, total, config.ingest.progress_margin);

    let comparison_id = Uuid::new_v4().to_string();
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO comparisons (id, name, description, kind, lower_bound, upper_bound, model_0_id, model_1_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&comparison_id)
    .bind(&name)
    .bind(&description)
    .bind(req.kind.as_str())
    .bind(req.lower_bound)
    .bind(req.upper_bound)
    .bind(&model_0.id)
    .bind(&model_1.id)
    .execute(&mut *tx)
    .await
    .map_err(|err| map_unique(err, &[("comparisons.name", "comparison name", name.as_str())]))?;
    progress.advance(1, &format!("Created comparison \"{}\"", name));

    let mut edges = 0u64;
    let mut rows: Vec<(&String, &String, f64)> = Vec::with_capacity(BIND_LIMIT / 4);
    for (i, topic_0_id) in topics_0.iter().enumerate() {
        for (j, topic_1_id) in topics_1.iter().enumerate() {
            rows.push((topic_0_id, topic_1_id, matrix.values[i][j]));
            if rows.len() >= BIND_LIMIT / 4 {
                edges += flush_edges(&mut tx, &comparison_id, &rows).await?;
                rows.clear();
            }
        }
        progress.advance(1, "Measuring topic pairs");
    }
    if !rows.is_empty() {
        edges += flush_edges(&mut tx, &comparison_id, &rows).await?;
    }

    tx.commit().await?;
    progress.finish(&format!("Comparison \"{}\" stored", name));

    Ok(AddSummary { name, edges })
}

async fn fetch_topic_ids(pool: &SqlitePool, model_id: &str) -> StoreResult<Vec<String>> {
    let rows = sqlx::query("SELECT id FROM topics WHERE model_id = ? ORDER BY topic_index ASC")
        .bind(model_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}

async fn flush_edges(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    comparison_id: &str,
    rows: &[(&String, &String, f64)],
) -> StoreResult<u64> {
    let mut written = 0u64;
    for chunk in rows.chunks(BIND_LIMIT / 4) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO topic_comparisons (comparison_id, topic_0_id, topic_1_id, value) ",
        );
        builder.push_values(chunk, |mut row, (topic_0_id, topic_1_id, value)| {
            row.push_bind(comparison_id.to_string());
            row.push_bind((*topic_0_id).clone());
            row.push_bind((*topic_1_id).clone());
            row.push_bind(*value);
        });
        written += builder.build().execute(&mut **tx).await?.rows_affected();
    }
    Ok(written)
}

/// Field edits for `compare update`. The model pair and edge values are
/// immutable; everything else is optional.
#[derive(Default)]
pub struct ComparisonUpdate {
    pub new_name: Option<String>,
    pub description: Option<String>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

pub async fn update_comparison(
    pool: &SqlitePool,
    name: &str,
    update: ComparisonUpdate,
) -> StoreResult<String> {
    let row = sqlx::query(
        "SELECT id, name, description, lower_bound, upper_bound FROM comparisons WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    let row = match row {
        Some(row) => row,
        None => return Err(StoreError::not_found("comparison", name)),
    };

    let id: String = row.get("id");
    let mut new_name: String = row.get("name");
    let mut description: String = row.get("description");
    let mut lower_bound: Option<f64> = row.get("lower_bound");
    let mut upper_bound: Option<f64> = row.get("upper_bound");

    if let Some(candidate) = &update.new_name {
        let slug = slugify(candidate);
        if slug.is_empty() {
            return Err(StoreError::validation(
                "comparison name must contain at least one alphanumeric character",
            ));
        }
        new_name = slug;
    }
    if let Some(value) = update.description {
        description = value;
    }
    if let Some(value) = update.lower_bound {
        lower_bound = Some(value);
    }
    if let Some(value) = update.upper_bound {
        upper_bound = Some(value);
    }

    sqlx::query(
        "UPDATE comparisons SET name = ?, description = ?, lower_bound = ?, upper_bound = ? \
         WHERE id = ?",
    )
    .bind(&new_name)
    .bind(&description)
    .bind(lower_bound)
    .bind(upper_bound)
    .bind(&id)
    .execute(pool)
    .await
    .map_err(|err| map_unique(err, &[("comparisons.name", "comparison name", new_name.as_str())]))?;

    Ok(new_name)
}

pub async fn delete_comparison(pool: &SqlitePool, name: &str) -> StoreResult<()> {
    let affected = sqlx::query("DELETE FROM comparisons WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(StoreError::not_found("comparison", name));
    }
    Ok(())
}

/// CLI entry point for `compare add`.
pub async fn run_add(
    config: &Config,
    req: NewComparison,
    reporter: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let summary = add_comparison(&pool, config, req, reporter).await?;
    println!("compare add {}", summary.name);
    println!("  topic pairs: {}", summary.edges);
    println!("ok");
    pool.close().await;
    Ok(())
}

/// CLI entry point for `compare list`.
pub async fn run_list(config: &Config, detailed: bool) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let rows = sqlx::query(
        "SELECT c.name, c.description, c.kind, c.lower_bound, c.upper_bound, \
         m0.name AS model_0, m1.name AS model_1, \
         (SELECT COUNT(*) FROM topic_comparisons tc WHERE tc.comparison_id = c.id) AS num_edges \
         FROM comparisons c \
         JOIN models m0 ON m0.id = c.model_0_id \
         JOIN models m1 ON m1.id = c.model_1_id \
         ORDER BY c.name",
    )
    .fetch_all(&pool)
    .await?;

    if detailed {
        for row in &rows {
            let name: String = row.get("name");
            let description: String = row.get("description");
            let kind: String = row.get("kind");
            let lower_bound: Option<f64> = row.get("lower_bound");
            let upper_bound: Option<f64> = row.get("upper_bound");
            let model_0: String = row.get("model_0");
            let model_1: String = row.get("model_1");
            let num_edges: i64 = row.get("num_edges");
            println!("{}: comparing models {}, {}", name, model_0, model_1);
            println!("    {}", description);
            println!("    kind: {}", kind);
            match (lower_bound, upper_bound) {
                (Some(lo), Some(hi)) => println!("    bounds: [{}, {}]", lo, hi),
                (Some(lo), None) => println!("    bounds: [{}, ∞)", lo),
                (None, Some(hi)) => println!("    bounds: (-∞, {}]", hi),
                (None, None) => {}
            }
            println!("    topic pairs: {}", num_edges);
        }
    } else {
        for row in &rows {
            let name: String = row.get("name");
            println!("{}", name);
        }
    }

    pool.close().await;
    Ok(())
}

/// CLI entry point for `compare update`.
pub async fn run_update(
    config: &Config,
    name: &str,
    update: ComparisonUpdate,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let new_name = update_comparison(&pool, name, update).await?;
    println!("compare update {}", new_name);
    println!("ok");
    pool.close().await;
    Ok(())
}

/// CLI entry point for `compare delete`.
pub async fn run_delete(config: &Config, name: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    delete_comparison(&pool, name).await?;
    println!("compare delete {}", name);
    println!("ok");
    pool.close().await;
    Ok(())
}
