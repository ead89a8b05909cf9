//! Model lifecycle operations: list, update, delete, keyphrases.
//!
//! Registration itself lives in [`crate::ingest`]; everything that touches
//! an already-registered model is here. Multi-row effects (promote-to-main
//! plus demotions, delete plus sole-owner term cleanup) are each one
//! transaction.

use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::error::{map_unique, StoreError, StoreResult};
use crate::models::TopicModel;
use crate::slug::slugify;

pub async fn fetch_model(pool: &SqlitePool, name: &str) -> StoreResult<TopicModel> {
    let row = sqlx::query(
        "SELECT id, name, path, description, training_context, is_main, preprocessor, use_tfidf, created_at \
         FROM models WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(TopicModel {
            id: row.get("id"),
            name: row.get("name"),
            path: row.get("path"),
            description: row.get("description"),
            training_context: row.get("training_context"),
            is_main: row.get("is_main"),
            preprocessor: row.get("preprocessor"),
            use_tfidf: row.get("use_tfidf"),
            created_at: row.get("created_at"),
        }),
        None => Err(StoreError::not_found("model", name)),
    }
}

/// Field edits for `model update`. `None` leaves the field unchanged.
#[derive(Default)]
pub struct ModelUpdate {
    pub new_name: Option<String>,
    pub description: Option<String>,
    pub training_context: Option<String>,
    pub set_main: bool,
    pub demote: bool,
    pub preprocessor: Option<String>,
    pub use_tfidf: Option<bool>,
}

pub async fn update_model(
    pool: &SqlitePool,
    name: &str,
    update: ModelUpdate,
) -> StoreResult<TopicModel> {
    let mut model = fetch_model(pool, name).await?;

    if let Some(new_name) = &update.new_name {
        let slug = slugify(new_name);
        if slug.is_empty() {
            return Err(StoreError::validation(
                "model name must contain at least one alphanumeric character",
            ));
        }
        model.name = slug;
    }
    if let Some(description) = update.description {
        model.description = description;
    }
    if let Some(training_context) = update.training_context {
        model.training_context = training_context;
    }
    if let Some(preprocessor) = update.preprocessor {
        model.preprocessor = preprocessor;
    }
    if let Some(use_tfidf) = update.use_tfidf {
        model.use_tfidf = use_tfidf;
    }
    if update.set_main {
        model.is_main = true;
    } else if update.demote {
        model.is_main = false;
    }

    let mut tx = pool.begin().await?;
    if update.set_main {
        sqlx::query("UPDATE models SET is_main = 0 WHERE id != ?")
            .bind(&model.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        "UPDATE models SET name = ?, description = ?, training_context = ?, is_main = ?, \
         preprocessor = ?, use_tfidf = ? WHERE id = ?",
    )
    .bind(&model.name)
    .bind(&model.description)
    .bind(&model.training_context)
    .bind(model.is_main)
    .bind(&model.preprocessor)
    .bind(model.use_tfidf)
    .bind(&model.id)
    .execute(&mut *tx)
    .await
    .map_err(|err| map_unique(err, &[("models.name", "model name", model.name.as_str())]))?;
    tx.commit().await?;

    Ok(model)
}

/// Delete a model. Terms referenced by this model alone go first;
/// after the cascade they would be unreachable orphans.
pub async fn delete_model(pool: &SqlitePool, name: &str) -> StoreResult<(String, u64)> {
    let model = fetch_model(pool, name).await?;

    let mut tx = pool.begin().await?;
    let sole_owner_terms = sqlx::query(
        r#"
        DELETE FROM terms WHERE id IN (
            SELECT tt.term_id
            FROM topic_terms tt
            JOIN topics t ON t.id = tt.topic_id
            GROUP BY tt.term_id
            HAVING COUNT(DISTINCT t.model_id) = 1 AND MAX(t.model_id = ?) = 1
        )
        "#,
    )
    .bind(&model.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query("DELETE FROM models WHERE id = ?")
        .bind(&model.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok((model.name, sole_owner_terms))
}

#[derive(Debug, Deserialize)]
struct KeyphraseEntry {
    topic: i64,
    keyphrase: String,
}

/// Apply a keyphrase file to a model's topics, or reset every keyphrase to
/// the empty string when no file is given. Entries for unknown topic
/// indexes are ignored.
pub async fn set_keyphrases(
    pool: &SqlitePool,
    model_name: &str,
    file: Option<&Path>,
) -> StoreResult<u64> {
    let model = fetch_model(pool, model_name).await?;

    let topic_rows = sqlx::query("SELECT id, topic_index FROM topics WHERE model_id = ?")
        .bind(&model.id)
        .fetch_all(pool)
        .await?;
    let topics: HashMap<i64, String> = topic_rows
        .iter()
        .map(|row| (row.get("topic_index"), row.get("id")))
        .collect();

    let mut updates: Vec<(String, String)> = Vec::new();
    match file {
        Some(path) => {
            let content =
                std::fs::read_to_string(path).map_err(|err| StoreError::artifact(path, err))?;
            let entries: Vec<KeyphraseEntry> =
                serde_json::from_str(&content).map_err(|err| StoreError::artifact(path, err))?;
            for entry in entries {
                if let Some(topic_id) = topics.get(&entry.topic) {
                    updates.push((topic_id.clone(), entry.keyphrase));
                }
            }
        }
        None => {
            for topic_id in topics.values() {
                updates.push((topic_id.clone(), String::new()));
            }
        }
    }

    let mut tx = pool.begin().await?;
    for (topic_id, keyphrase) in &updates {
        sqlx::query("UPDATE topics SET keyphrase = ? WHERE id = ?")
            .bind(keyphrase)
            .bind(topic_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(updates.len() as u64)
}

/// CLI entry point for `model list`.
pub async fn run_list(config: &Config, detailed: bool) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let rows = sqlx::query(
        "SELECT m.name, m.description, m.training_context, m.path, m.is_main, m.preprocessor, m.use_tfidf, \
         (SELECT COUNT(*) FROM topics t WHERE t.model_id = m.id) AS num_topics \
         FROM models m ORDER BY m.name",
    )
    .fetch_all(&pool)
    .await?;

    if detailed {
        for (i, row) in rows.iter().enumerate() {
            let name: String = row.get("name");
            let is_main: bool = row.get("is_main");
            let num_topics: i64 = row.get("num_topics");
            let description: String = row.get("description");
            let training_context: String = row.get("training_context");
            let path: String = row.get("path");
            let preprocessor: String = row.get("preprocessor");
            let use_tfidf: bool = row.get("use_tfidf");
            println!(
                "{}. {}{} with {} topics",
                i,
                name,
                if is_main { " - MAIN MODEL" } else { "" },
                num_topics
            );
            println!("    {}", description);
            if !training_context.is_empty() {
                println!("    {}", training_context);
            }
            println!("    loaded from: {}", path);
            println!("    preprocessor: {}", preprocessor);
            println!("    use tf-idf: {}", use_tfidf);
            println!();
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

/// CLI entry point for `model topics`: every topic of a model with its
/// keyphrase and stored terms in descending weight order.
pub async fn run_topics(config: &Config, model_name: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let model = fetch_model(&pool, model_name).await?;

    let rows = sqlx::query(
        "SELECT t.topic_index, t.keyphrase, te.string, tt.value \
         FROM topics t \
         JOIN topic_terms tt ON tt.topic_id = t.id \
         JOIN terms te ON te.id = tt.term_id \
         WHERE t.model_id = ? \
         ORDER BY t.topic_index ASC, tt.value DESC, te.string ASC",
    )
    .bind(&model.id)
    .fetch_all(&pool)
    .await?;

    let mut current: Option<i64> = None;
    for row in &rows {
        let topic_index: i64 = row.get("topic_index");
        let keyphrase: String = row.get("keyphrase");
        let string: String = row.get("string");
        let value: f64 = row.get("value");
        if current != Some(topic_index) {
            if current.is_some() {
                println!();
            }
            if keyphrase.is_empty() {
                println!("topic {}", topic_index);
            } else {
                println!("topic {} ({})", topic_index, keyphrase);
            }
            current = Some(topic_index);
        }
        println!("  {:.5}  {}", value, string);
    }

    pool.close().await;
    Ok(())
}

/// CLI entry point for `model update`.
pub async fn run_update(config: &Config, name: &str, update: ModelUpdate) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let model = update_model(&pool, name, update).await?;
    println!("model update {}", model.name);
    if model.is_main {
        println!("  main model: yes");
    }
    println!("ok");
    pool.close().await;
    Ok(())
}

/// CLI entry point for `model delete`.
pub async fn run_delete(config: &Config, name: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let (deleted, sole_owner_terms) = delete_model(&pool, name).await?;
    println!("model delete {}", deleted);
    println!("  orphaned terms removed: {}", sole_owner_terms);
    println!("ok");
    pool.close().await;
    Ok(())
}

/// CLI entry point for `model set-keyphrases`.
pub async fn run_set_keyphrases(
    config: &Config,
    model_name: &str,
    file: Option<&Path>,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let updated = set_keyphrases(&pool, model_name, file).await?;
    println!("model set-keyphrases {}", model_name);
    println!("  topics updated: {}", updated);
    println!("ok");
    pool.close().await;
    Ok(())
}
