//! Article full-text search.
//!
//! Queries the FTS5 index over article titles and abstracts. Title hits
//! outrank abstract hits through the bm25 column weights from config.
//! User input is quoted token by token so FTS operators in a query string
//! are matched literally.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{StoreError, StoreResult};

/// One search hit, best first.
#[derive(Debug, Clone)]
pub struct ArticleHit {
    pub identifier: String,
    pub title: String,
    pub year: Option<i64>,
    pub score: f64,
    pub snippet: String,
}

pub async fn search_articles(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    corpus: Option<&str>,
    limit: Option<i64>,
) -> StoreResult<Vec<ArticleHit>> {
    let match_query = quote_query(query);
    if match_query.is_empty() {
        return Ok(Vec::new());
    }
    let limit = limit.unwrap_or(config.search.final_limit);

    let corpus_id: Option<String> = match corpus {
        Some(name) => {
            let id: Option<String> = sqlx::query_scalar("SELECT id FROM corpora WHERE name = ?")
                .bind(name)
                .fetch_optional(pool)
                .await?;
            match id {
                Some(id) => Some(id),
                None => return Err(StoreError::not_found("corpus", name)),
            }
        }
        None => None,
    };

    let mut sql = String::from(
        "SELECT a.identifier, a.title, a.year, \
         snippet(articles_fts, 2, '[', ']', '…', 12) AS snip, \
         bm25(articles_fts, 0.0, ?, ?) AS score \
         FROM articles_fts \
         JOIN articles a ON a.id = articles_fts.article_id \
         WHERE articles_fts MATCH ?",
    );
    if corpus_id.is_some() {
        sql.push_str(" AND a.corpus_id = ?");
    }
    sql.push_str(" ORDER BY score ASC LIMIT ?");

    let mut query_builder = sqlx::query(&sql)
        .bind(config.search.title_weight)
        .bind(config.search.abstract_weight)
        .bind(&match_query);
    if let Some(ref id) = corpus_id {
        query_builder = query_builder.bind(id);
    }
    let rows = query_builder.bind(limit).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("score");
            ArticleHit {
                identifier: row.get("identifier"),
                title: row.get("title"),
                year: row.get("year"),
                // bm25 is smaller-is-better and negative; negate so higher
                // reads better.
                score: -rank,
                snippet: row.get("snip"),
            }
        })
        .collect())
}

/// Turn free text into an FTS5 query of quoted tokens.
fn quote_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// CLI entry point for `search`.
pub async fn run_search(
    config: &Config,
    query: &str,
    corpus: Option<String>,
    limit: Option<i64>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let hits = search_articles(&pool, config, query, corpus.as_deref(), limit).await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let year = hit
            .year
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        println!("{}. [{:.2}] {}{}", i + 1, hit.score, hit.title, year);
        println!("    identifier: {}", hit.identifier);
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!();
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_each_token() {
        assert_eq!(quote_query("neural topic"), "\"neural\" \"topic\"");
    }

    #[test]
    fn operators_become_literals() {
        assert_eq!(quote_query("a OR b"), "\"a\" \"OR\" \"b\"");
        assert_eq!(quote_query("col\"umn"), "\"col\"\"umn\"");
    }

    #[test]
    fn empty_input_yields_empty_query() {
        assert_eq!(quote_query("   "), "");
    }
}
