//! Database statistics and health overview.
//!
//! A quick summary of what's stored: models, topics, terms, corpora,
//! articles, assignments, reported errors and comparisons. Used by
//! `topicdb stats` to confirm ingestions landed as expected.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let n: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(n)
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let models = count(&pool, "models").await?;
    let topics = count(&pool, "topics").await?;
    let terms = count(&pool, "terms").await?;
    let term_weights = count(&pool, "topic_terms").await?;
    let corpora = count(&pool, "corpora").await?;
    let articles = count(&pool, "articles").await?;
    let assignments = count(&pool, "article_topics").await?;
    let reported_errors = count(&pool, "reported_errors").await?;
    let comparisons = count(&pool, "comparisons").await?;
    let comparison_edges = count(&pool, "topic_comparisons").await?;

    let main_model: Option<String> =
        sqlx::query_scalar("SELECT name FROM models WHERE is_main = 1")
            .fetch_optional(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("topicdb — Database Stats");
    println!("========================");
    println!();
    println!("  database:         {}", config.db.path.display());
    println!("  size:             {}", format_bytes(db_size));
    println!();
    println!("  models:           {}", models);
    println!(
        "  main model:       {}",
        main_model.as_deref().unwrap_or("(none)")
    );
    println!("  topics:           {}", topics);
    println!("  terms:            {}", terms);
    println!("  term weights:     {}", term_weights);
    println!();
    println!("  corpora:          {}", corpora);
    println!("  articles:         {}", articles);
    println!("  assignments:      {}", assignments);
    println!("  reported errors:  {}", reported_errors);
    println!();
    println!("  comparisons:      {}", comparisons);
    println!("  comparison edges: {}", comparison_edges);

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
