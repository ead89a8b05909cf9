//! Bulk loading of per-article topic assignments.
//!
//! `assign` consumes the dumps produced by an offline inference job: one
//! JSON object per line mapping an article identifier to its topic
//! distribution, plus an optional second set of dumps recording articles
//! whose analysis failed.
//!
//! An article qualifies only while it has neither topic assignments nor a
//! reported error, so re-running the same dump is a no-op and an article
//! never ends up with both. Qualifying distributions are ranked by
//! descending value (rank 1 is the strongest topic) and flushed in bulk
//! batches. A bad row is skipped and counted; it never aborts the batch.

use serde::Deserialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::ingest::BIND_LIMIT;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::registry::fetch_model;

#[derive(Debug, Deserialize)]
struct AssignmentRecord {
    identifier: String,
    topics: Vec<TopicValue>,
}

#[derive(Debug, Deserialize)]
struct TopicValue {
    topic: i64,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorRecord {
    identifier: String,
    error: String,
}

/// Aggregate counts for one `assign` run.
#[derive(Debug, Default)]
pub struct AssignSummary {
    pub model: String,
    pub articles_assigned: u64,
    pub rows_written: u64,
    pub skipped: u64,
    pub errors_recorded: u64,
    pub errors_skipped: u64,
}

pub async fn assign_topics(
    pool: &SqlitePool,
    config: &Config,
    inputs: &[PathBuf],
    error_inputs: &[PathBuf],
    model_override: Option<&str>,
    batch_size: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> StoreResult<AssignSummary> {
    let batch_size = batch_size.unwrap_or(config.ingest.batch_size);
    if batch_size == 0 {
        return Err(StoreError::validation("batch size must be at least 1"));
    }

    let model = match model_override {
        Some(name) => fetch_model(pool, name).await?,
        None => fetch_main_model(pool).await?,
    };

    let topic_rows = sqlx::query("SELECT id, topic_index FROM topics WHERE model_id = ?")
        .bind(&model.id)
        .fetch_all(pool)
        .await?;
    let topics: HashMap<i64, String> = topic_rows
        .iter()
        .map(|row| (row.get("topic_index"), row.get("id")))
        .collect();

    let total_lines = count_lines(inputs)? + count_lines(error_inputs)?;
    let mut progress = ProgressTracker::new(reporter, total_lines, config.ingest.progress_margin);

    let mut summary = AssignSummary {
        model: model.name.clone(),
        ..AssignSummary::default()
    };

    // Articles claimed during this run: the untouched-guard only sees
    // flushed rows, so in-flight claims are tracked here.
    let mut claimed: HashSet<String> = HashSet::new();

    let mut batch: Vec<(String, String, i64, f64)> = Vec::with_capacity(batch_size);
    for path in inputs {
        for line in read_lines(path)? {
            let line = line.map_err(|err| StoreError::artifact(path, err))?;
            progress.advance(1, "Assigning article topics");
            if line.trim().is_empty() {
                continue;
            }
            let record: AssignmentRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(%err, "skipping malformed assignment line");
                    summary.skipped += 1;
                    continue;
                }
            };

            let article_id = match untouched_article(pool, &claimed, &record.identifier).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(identifier = %record.identifier, %err, "skipping assignment row");
                    summary.skipped += 1;
                    continue;
                }
            };

            let mut values: Vec<(String, f64)> = record
                .topics
                .iter()
                .filter_map(|tv| topics.get(&tv.topic).map(|id| (id.clone(), tv.value)))
                .collect();
            if values.len() < record.topics.len() {
                tracing::warn!(
                    identifier = %record.identifier,
                    "assignment references topics outside model \"{}\"",
                    model.name
                );
            }
            if values.is_empty() {
                summary.skipped += 1;
                continue;
            }
            values.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            claimed.insert(article_id.clone());
            summary.articles_assigned += 1;
            for (rank, (topic_id, value)) in values.into_iter().enumerate() {
                batch.push((article_id.clone(), topic_id, rank as i64 + 1, value));
            }
            if batch.len() >= batch_size {
                summary.rows_written += flush_assignments(pool, &batch).await?;
                batch.clear();
            }
        }
    }
    if !batch.is_empty() {
        summary.rows_written += flush_assignments(pool, &batch).await?;
        batch.clear();
    }

    // Second pass: reported errors, under the same untouched-guard.
    let mut error_batch: Vec<(String, String)> = Vec::with_capacity(batch_size);
    for path in error_inputs {
        for line in read_lines(path)? {
            let line = line.map_err(|err| StoreError::artifact(path, err))?;
            progress.advance(1, "Recording analysis errors");
            if line.trim().is_empty() {
                continue;
            }
            let record: ErrorRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(%err, "skipping malformed error line");
                    summary.errors_skipped += 1;
                    continue;
                }
            };
            let article_id = match untouched_article(pool, &claimed, &record.identifier).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    summary.errors_skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(identifier = %record.identifier, %err, "skipping error row");
                    summary.errors_skipped += 1;
                    continue;
                }
            };
            claimed.insert(article_id.clone());
            error_batch.push((article_id, record.error));
            if error_batch.len() >= batch_size {
                summary.errors_recorded += flush_errors(pool, &error_batch).await?;
                error_batch.clear();
            }
        }
    }
    if !error_batch.is_empty() {
        summary.errors_recorded += flush_errors(pool, &error_batch).await?;
    }

    progress.finish("Assignments stored");
    Ok(summary)
}

async fn fetch_main_model(pool: &SqlitePool) -> StoreResult<crate::models::TopicModel> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM models WHERE is_main = 1")
        .fetch_optional(pool)
        .await?;
    match name {
        Some(name) => fetch_model(pool, &name).await,
        None => Err(StoreError::validation(
            "no model is set as the main model; pass --model or promote one with \
             `model update <name> --main`",
        )),
    }
}

/// The at-most-once guard: an article qualifies only while it has neither
/// topic assignments nor a reported error, and was not already claimed in
/// this run.
async fn untouched_article(
    pool: &SqlitePool,
    claimed: &HashSet<String>,
    identifier: &str,
) -> Result<Option<String>, sqlx::Error> {
    let id: Option<String> = sqlx::query_scalar(
        "SELECT a.id FROM articles a WHERE a.identifier = ? \
         AND NOT EXISTS (SELECT 1 FROM article_topics at WHERE at.article_id = a.id) \
         AND NOT EXISTS (SELECT 1 FROM reported_errors re WHERE re.article_id = a.id)",
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await?;
    Ok(id.filter(|id| !claimed.contains(id)))
}

async fn flush_assignments(
    pool: &SqlitePool,
    rows: &[(String, String, i64, f64)],
) -> StoreResult<u64> {
    let mut written = 0u64;
    for chunk in rows.chunks(BIND_LIMIT / 4) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT OR IGNORE INTO article_topics (article_id, topic_id, rank, value) ",
        );
        builder.push_values(chunk, |mut row, (article_id, topic_id, rank, value)| {
            row.push_bind(article_id.clone());
            row.push_bind(topic_id.clone());
            row.push_bind(*rank);
            row.push_bind(*value);
        });
        written += builder.build().execute(pool).await?.rows_affected();
    }
    Ok(written)
}

async fn flush_errors(pool: &SqlitePool, rows: &[(String, String)]) -> StoreResult<u64> {
    let mut written = 0u64;
    for chunk in rows.chunks(BIND_LIMIT / 2) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT OR IGNORE INTO reported_errors (article_id, error_description) ",
        );
        builder.push_values(chunk, |mut row, (article_id, error)| {
            row.push_bind(article_id.clone());
            row.push_bind(error.clone());
        });
        written += builder.build().execute(pool).await?.rows_affected();
    }
    Ok(written)
}

fn count_lines(paths: &[PathBuf]) -> StoreResult<u64> {
    let mut count = 0u64;
    for path in paths {
        for line in read_lines(path)? {
            line.map_err(|err| StoreError::artifact(path, err))?;
            count += 1;
        }
    }
    Ok(count)
}

fn read_lines(path: &Path) -> StoreResult<std::io::Lines<BufReader<File>>> {
    let file = File::open(path).map_err(|err| StoreError::artifact(path, err))?;
    Ok(BufReader::new(file).lines())
}

/// CLI entry point for `assign`.
pub async fn run_assign(
    config: &Config,
    inputs: Vec<PathBuf>,
    error_inputs: Vec<PathBuf>,
    model_override: Option<String>,
    batch_size: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let summary = assign_topics(
        &pool,
        config,
        &inputs,
        &error_inputs,
        model_override.as_deref(),
        batch_size,
        reporter,
    )
    .await?;
    println!("assign {}", summary.model);
    println!("  articles assigned: {}", summary.articles_assigned);
    println!("  rows written: {}", summary.rows_written);
    println!("  skipped: {}", summary.skipped);
    if !error_inputs.is_empty() {
        println!("  errors recorded: {}", summary.errors_recorded);
        println!("  error rows skipped: {}", summary.errors_skipped);
    }
    println!("ok");
    pool.close().await;
    Ok(())
}
