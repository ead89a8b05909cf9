//! Corpus ingestion and management.
//!
//! `corpus load` streams documents from a [`DocumentReader`] into the
//! articles table in bulk batches. Duplicate identifiers anywhere in the
//! store are dropped silently (INSERT OR IGNORE) and counted; the search
//! index rows are written only for articles a batch actually inserted.
//!
//! The loader makes two passes over the reader: one to count documents so
//! progress totals are exact, one to load. The double read is the accepted
//! price for accurate reporting on sources of unknown length.

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::error::{map_unique, StoreError, StoreResult};
use crate::ingest::BIND_LIMIT;
use crate::progress::{ProgressReporter, ProgressTracker};
use crate::reader::{DocumentReader, JsonlReader, RawDocument};

/// What a completed load wrote and skipped.
pub struct LoadSummary {
    pub name: String,
    pub articles_written: u64,
    pub duplicates_skipped: u64,
    pub malformed_skipped: u64,
}

struct ArticleRow {
    id: String,
    identifier: String,
    title: String,
    abstract_text: String,
    year: Option<i64>,
    authors: String,
    language: String,
}

impl ArticleRow {
    fn from_document(doc: RawDocument) -> Self {
        let title = doc.title.unwrap_or_else(|| doc.identifier.clone());
        ArticleRow {
            id: Uuid::new_v4().to_string(),
            identifier: doc.identifier,
            title,
            abstract_text: doc.abstract_text,
            year: doc.year,
            authors: doc.authors.join(", "),
            language: doc.language.unwrap_or_default(),
        }
    }
}

pub async fn load_corpus(
    pool: &SqlitePool,
    config: &Config,
    reader: &dyn DocumentReader,
    name: &str,
    description: &str,
    batch_size: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> StoreResult<LoadSummary> {
    let batch_size = batch_size.unwrap_or(config.ingest.batch_size);
    if batch_size == 0 {
        return Err(StoreError::validation("batch size must be at least 1"));
    }

    // Counting pass.
    let mut document_count: u64 = 0;
    for doc in reader.documents()? {
        doc?;
        document_count += 1;
    }

    let total = 1 + 2 * document_count;
    let mut progress = ProgressTracker::new(reporter, total, config.ingest.progress_margin);

    let corpus_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO corpora (id, name, description, created_at) VALUES (?, ?, ?, ?)")
        .bind(&corpus_id)
        .bind(name)
        .bind(description)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| map_unique(err, &[("corpora.name", "corpus name", name)]))?;
    progress.advance(1, &format!("Created corpus \"{}\"", name));

    let mut articles_written = 0u64;
    let mut articles_seen = 0u64;
    let mut batch: Vec<ArticleRow> = Vec::with_capacity(batch_size);

    for doc in reader.documents()? {
        // A reader-level failure aborts and rolls back the whole load.
        let doc = doc?;
        batch.push(ArticleRow::from_document(doc));
        if batch.len() >= batch_size {
            articles_seen += batch.len() as u64;
            articles_written += flush_articles(&mut tx, &corpus_id, &batch).await?;
            progress.advance(
                2 * batch.len() as u64,
                &format!("Loaded {} articles", articles_seen),
            );
            batch.clear();
        }
    }
    if !batch.is_empty() {
        articles_seen += batch.len() as u64;
        articles_written += flush_articles(&mut tx, &corpus_id, &batch).await?;
        progress.advance(
            2 * batch.len() as u64,
            &format!("Loaded {} articles", articles_seen),
        );
        batch.clear();
    }

    tx.commit().await?;
    progress.finish(&format!("Corpus \"{}\" loaded", name));

    Ok(LoadSummary {
        name: name.to_string(),
        articles_written,
        duplicates_skipped: articles_seen - articles_written,
        malformed_skipped: reader.skipped(),
    })
}

/// Bulk-insert one batch, ignoring identifier conflicts, and index exactly
/// the rows that were inserted. The generated UUID identifies which rows
/// survived the OR IGNORE.
async fn flush_articles(
    tx: &mut Transaction<'_, Sqlite>,
    corpus_id: &str,
    batch: &[ArticleRow],
) -> StoreResult<u64> {
    let mut written = 0u64;
    for chunk in batch.chunks(BIND_LIMIT / 8) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT OR IGNORE INTO articles \
             (id, identifier, corpus_id, title, abstract, year, authors, language) ",
        );
        builder.push_values(chunk, |mut row, article| {
            row.push_bind(article.id.clone());
            row.push_bind(article.identifier.clone());
            row.push_bind(corpus_id.to_string());
            row.push_bind(article.title.clone());
            row.push_bind(article.abstract_text.clone());
            row.push_bind(article.year);
            row.push_bind(article.authors.clone());
            row.push_bind(article.language.clone());
        });
        written += builder.build().execute(&mut **tx).await?.rows_affected();

        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "INSERT INTO articles_fts (article_id, title, abstract) \
             SELECT id, title, abstract FROM articles WHERE id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for article in chunk {
            query = query.bind(article.id.clone());
        }
        query.execute(&mut **tx).await?;
    }
    Ok(written)
}

/// Delete a corpus and everything loaded under it. The FTS rows have no
/// foreign key, so they go explicitly before the cascade.
pub async fn delete_corpus(pool: &SqlitePool, name: &str) -> StoreResult<String> {
    let row = sqlx::query("SELECT id, name FROM corpora WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    let (corpus_id, corpus_name): (String, String) = match row {
        Some(row) => (row.get("id"), row.get("name")),
        None => return Err(StoreError::not_found("corpus", name)),
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        "DELETE FROM articles_fts WHERE article_id IN \
         (SELECT id FROM articles WHERE corpus_id = ?)",
    )
    .bind(&corpus_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM corpora WHERE id = ?")
        .bind(&corpus_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(corpus_name)
}

/// CLI entry point for `corpus load`.
pub async fn run_load(
    config: &Config,
    paths: Vec<std::path::PathBuf>,
    name: &str,
    description: &str,
    batch_size: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    let reader = JsonlReader::new(paths)?;
    let pool = db::connect(config).await?;
    let summary = load_corpus(&pool, config, &reader, name, description, batch_size, reporter).await?;
    println!("corpus load {}", summary.name);
    println!("  articles written: {}", summary.articles_written);
    println!("  duplicates skipped: {}", summary.duplicates_skipped);
    println!("  malformed skipped: {}", summary.malformed_skipped);
    println!("ok");
    pool.close().await;
    Ok(())
}

/// CLI entry point for `corpus list`.
pub async fn run_list(config: &Config, detailed: bool) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let rows = sqlx::query(
        "SELECT c.name, c.description, c.created_at, \
         (SELECT COUNT(*) FROM articles a WHERE a.corpus_id = c.id) AS num_articles \
         FROM corpora c ORDER BY c.name",
    )
    .fetch_all(&pool)
    .await?;

    if detailed {
        for row in &rows {
            let name: String = row.get("name");
            let description: String = row.get("description");
            let num_articles: i64 = row.get("num_articles");
            let created_at: i64 = row.get("created_at");
            let date = chrono::DateTime::from_timestamp(created_at, 0)
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            println!("{} ({} articles, loaded {})", name, num_articles, date);
            println!("    {}", description);
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

/// CLI entry point for `corpus delete`.
pub async fn run_delete(config: &Config, name: &str) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let deleted = delete_corpus(&pool, name).await?;
    println!("corpus delete {}", deleted);
    println!("ok");
    pool.close().await;
    Ok(())
}
