//! Topic-model ingestion pipeline.
//!
//! `model create` materializes a trained LDA artifact into the relational
//! store: the model row, its topics, the top-N terms of every topic and
//! their weights. Terms are get-or-created by exact vocabulary string and
//! shared across models; terms left without any weight reference after the
//! run (possible on re-ingestion and model-swap scenarios) are swept.
//!
//! The whole ingestion is one transaction: a name or path collision, an
//! unreadable artifact, or any write failure leaves no partial model
//! behind. Writes follow dependency order: model, terms, topics, weights.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::artifact::TopicModelArtifact;
use crate::config::Config;
use crate::db;
use crate::error::{map_unique, StoreError, StoreResult};
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::slug::slugify;

/// Keep multi-row statements comfortably under SQLite's bind limit.
pub(crate) const BIND_LIMIT: usize = 900;

/// Parameters for registering a new model.
pub struct NewModel {
    pub name: String,
    pub artifact_path: PathBuf,
    pub description: Option<String>,
    pub training_context: Option<String>,
    pub main: bool,
    /// Terms stored per topic; falls back to `ingest.top_n` from config.
    pub top_n: Option<usize>,
    pub preprocessor: Option<String>,
    pub use_tfidf: bool,
}

/// What a completed ingestion wrote.
pub struct CreateSummary {
    pub name: String,
    pub num_topics: usize,
    pub terms_created: u64,
    pub orphan_terms_removed: u64,
    pub main: bool,
}

pub async fn create_model(
    pool: &SqlitePool,
    config: &Config,
    req: NewModel,
    reporter: &dyn ProgressReporter,
) -> StoreResult<CreateSummary> {
    let top_n = req.top_n.unwrap_or(config.ingest.top_n);
    if top_n < 1 {
        return Err(StoreError::validation("top-n must be at least 1"));
    }
    let name = slugify(&req.name);
    if name.is_empty() {
        return Err(StoreError::validation(
            "model name must contain at least one alphanumeric character",
        ));
    }
    let description = req.description.unwrap_or_else(|| req.name.clone());
    let training_context = req.training_context.unwrap_or_default();
    let preprocessor = req
        .preprocessor
        .unwrap_or_else(|| "default".to_string());

    let artifact = TopicModelArtifact::load(&req.artifact_path)?;
    let selections = artifact.top_terms(top_n);
    let num_topics = artifact.num_topics();
    let effective_n = selections.first().map(|s| s.len() as u64).unwrap_or(0);

    let total = 2 + num_topics as u64 + 2 * num_topics as u64 * effective_n;
    let mut progress = ProgressTracker::new(reporter, total, config.ingest.progress_margin);

    let path_text = req.artifact_path.to_string_lossy().to_string();
    let model_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO models (id, name, path, description, training_context, is_main, preprocessor, use_tfidf, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&model_id)
    .bind(&name)
    .bind(&path_text)
    .bind(&description)
    .bind(&training_context)
    .bind(req.main)
    .bind(&preprocessor)
    .bind(req.use_tfidf)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|err| {
        map_unique(
            err,
            &[
                ("models.name", "model name", name.as_str()),
                ("models.path", "model path", path_text.as_str()),
            ],
        )
    })?;
    progress.advance(1, &format!("Created model \"{}\"", name));

    // Dedupe the selected vocabulary indices across topics. BTreeMap keeps
    // term creation order deterministic.
    let mut selected: BTreeMap<usize, &str> = BTreeMap::new();
    for topic_terms in &selections {
        for &(term_index, _) in topic_terms {
            selected
                .entry(term_index)
                .or_insert_with(|| artifact.vocabulary[term_index].as_str());
        }
        progress.advance(effective_n, "Creating model terms");
    }

    let (term_ids, terms_created) = get_or_create_terms(&mut tx, &selected).await?;

    // Topics go in before the weights that reference them.
    let topic_ids: Vec<String> = (0..num_topics)
        .map(|_| Uuid::new_v4().to_string())
        .collect();
    let topic_rows: Vec<(usize, &String)> = topic_ids.iter().enumerate().collect();
    for chunk in topic_rows.chunks(BIND_LIMIT / 4) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO topics (id, model_id, topic_index, keyphrase) ");
        builder.push_values(chunk, |mut row, (topic_index, topic_id)| {
            row.push_bind((*topic_id).clone());
            row.push_bind(model_id.clone());
            row.push_bind(*topic_index as i64);
            row.push_bind("");
        });
        builder.build().execute(&mut *tx).await?;
    }
    progress.advance(num_topics as u64, "Created model topics");

    // One weight sweep per topic, flushed in bind-limit chunks.
    let mut weight_rows: Vec<(String, String, f64)> = Vec::with_capacity(BIND_LIMIT / 3);
    for (topic_index, topic_terms) in selections.iter().enumerate() {
        for &(term_index, value) in topic_terms {
            weight_rows.push((
                topic_ids[topic_index].clone(),
                term_ids[&term_index].clone(),
                value,
            ));
        }
        if weight_rows.len() >= BIND_LIMIT / 3 {
            flush_weights(&mut tx, &weight_rows).await?;
            weight_rows.clear();
        }
        progress.advance(effective_n, "Connecting topics to terms");
    }
    if !weight_rows.is_empty() {
        flush_weights(&mut tx, &weight_rows).await?;
    }

    // Terms that lost their last weight reference.
    let orphan_terms_removed =
        sqlx::query("DELETE FROM terms WHERE id NOT IN (SELECT DISTINCT term_id FROM topic_terms)")
            .execute(&mut *tx)
            .await?
            .rows_affected();

    if req.main {
        sqlx::query("UPDATE models SET is_main = 0 WHERE id != ?")
            .bind(&model_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    progress.finish(&format!("Registered model \"{}\"", name));

    Ok(CreateSummary {
        name,
        num_topics,
        terms_created,
        orphan_terms_removed,
        main: req.main,
    })
}

/// Get-or-create terms by exact vocabulary string. Existing rows keep
/// their ids; the returned map covers every requested index.
async fn get_or_create_terms(
    tx: &mut Transaction<'_, Sqlite>,
    selected: &BTreeMap<usize, &str>,
) -> StoreResult<(HashMap<usize, String>, u64)> {
    let mut term_ids: HashMap<usize, String> = HashMap::with_capacity(selected.len());
    let mut created = 0u64;
    let entries: Vec<(usize, &str)> = selected.iter().map(|(&i, &s)| (i, s)).collect();

    for chunk in entries.chunks(BIND_LIMIT / 2) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT OR IGNORE INTO terms (id, string) ");
        builder.push_values(chunk, |mut row, (_, string)| {
            row.push_bind(Uuid::new_v4().to_string());
            row.push_bind(string.to_string());
        });
        created += builder.build().execute(&mut **tx).await?.rows_affected();

        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!("SELECT string, id FROM terms WHERE string IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for (_, string) in chunk {
            query = query.bind(string.to_string());
        }
        let rows = query.fetch_all(&mut **tx).await?;
        let by_string: HashMap<String, String> = rows
            .iter()
            .map(|row| (row.get("string"), row.get("id")))
            .collect();
        for (term_index, string) in chunk {
            match by_string.get(*string) {
                Some(id) => {
                    term_ids.insert(*term_index, id.clone());
                }
                None => {
                    return Err(StoreError::validation(format!(
                        "term \"{}\" could not be stored",
                        string
                    )))
                }
            }
        }
    }

    Ok((term_ids, created))
}

async fn flush_weights(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[(String, String, f64)],
) -> StoreResult<()> {
    for chunk in rows.chunks(BIND_LIMIT / 3) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO topic_terms (topic_id, term_id, value) ");
        builder.push_values(chunk, |mut row, (topic_id, term_id, value)| {
            row.push_bind(topic_id.clone());
            row.push_bind(term_id.clone());
            row.push_bind(*value);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

/// CLI entry point for `model create`.
pub async fn run_create(
    config: &Config,
    req: NewModel,
    reporter: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let summary = create_model(&pool, config, req, reporter).await?;
    println!("model create {}", summary.name);
    println!("  topics: {}", summary.num_topics);
    println!("  terms created: {}", summary.terms_created);
    println!("  orphaned terms removed: {}", summary.orphan_terms_removed);
    if summary.main {
        println!("  set as main model");
    }
    println!("ok");
    pool.close().await;
    Ok(())
}
