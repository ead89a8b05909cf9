use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Registered topic models
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS models (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            path TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            training_context TEXT NOT NULL DEFAULT '',
            is_main INTEGER NOT NULL DEFAULT 0,
            preprocessor TEXT NOT NULL DEFAULT 'default',
            use_tfidf INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Topics, zero-indexed within their model
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            id TEXT PRIMARY KEY,
            model_id TEXT NOT NULL,
            topic_index INTEGER NOT NULL,
            keyphrase TEXT NOT NULL DEFAULT '',
            UNIQUE(model_id, topic_index),
            FOREIGN KEY (model_id) REFERENCES models(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Vocabulary terms, shared across models
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS terms (
            id TEXT PRIMARY KEY,
            string TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Term weight within a topic
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_terms (
            topic_id TEXT NOT NULL,
            term_id TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (topic_id, term_id),
            FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE,
            FOREIGN KEY (term_id) REFERENCES terms(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Loaded corpora
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS corpora (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Articles; identifiers are unique application-wide, not per corpus
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            identifier TEXT NOT NULL UNIQUE,
            corpus_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            abstract TEXT NOT NULL,
            year INTEGER,
            authors TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (corpus_id) REFERENCES corpora(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Ranked topic assignments per article
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS article_topics (
            article_id TEXT NOT NULL,
            topic_id TEXT NOT NULL,
            rank INTEGER NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (article_id, topic_id),
            FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE,
            FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // One failed-analysis record per article, exclusive with article_topics
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reported_errors (
            article_id TEXT PRIMARY KEY,
            error_description TEXT NOT NULL,
            FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Registered model-pair comparisons
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comparisons (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL CHECK (kind IN ('score', 'distance')),
            lower_bound REAL,
            upper_bound REAL,
            model_0_id TEXT NOT NULL,
            model_1_id TEXT NOT NULL,
            FOREIGN KEY (model_0_id) REFERENCES models(id) ON DELETE CASCADE,
            FOREIGN KEY (model_1_id) REFERENCES models(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Dense topic-pair measurements of a comparison
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_comparisons (
            comparison_id TEXT NOT NULL,
            topic_0_id TEXT NOT NULL,
            topic_1_id TEXT NOT NULL,
            value REAL NOT NULL,
            PRIMARY KEY (comparison_id, topic_0_id, topic_1_id),
            FOREIGN KEY (comparison_id) REFERENCES comparisons(id) ON DELETE CASCADE,
            FOREIGN KEY (topic_0_id) REFERENCES topics(id) ON DELETE CASCADE,
            FOREIGN KEY (topic_1_id) REFERENCES topics(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create FTS5 virtual table over article title + abstract
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='articles_fts'",
    )
    .fetch_one(&pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE articles_fts USING fts5(
                article_id UNINDEXED,
                title,
                abstract
            )
            "#,
        )
        .execute(&pool)
        .await?;
    }

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_topics_model_id ON topics(model_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_topic_terms_term_id ON topic_terms(term_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_corpus_id ON articles(corpus_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_identifier ON articles(identifier)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_topic_comparisons_comparison_id \
         ON topic_comparisons(comparison_id)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
