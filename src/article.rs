//! Article retrieval by identifier.
//!
//! Fetches an article's stored fields plus what the main model thinks of
//! it: the ranked topic assignments (with keyphrases and the strongest
//! stored terms of each topic) or the recorded analysis error.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Serialize)]
pub struct ArticleView {
    pub identifier: String,
    pub title: String,
    pub abstract_text: String,
    pub year: Option<i64>,
    pub authors: String,
    pub language: String,
    pub corpus: String,
    pub topics: Vec<TopicAssignment>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicAssignment {
    pub rank: i64,
    pub topic_index: i64,
    pub keyphrase: String,
    pub value: f64,
    pub top_terms: Vec<String>,
}

pub async fn get_article(pool: &SqlitePool, identifier: &str) -> StoreResult<ArticleView> {
    let row = sqlx::query(
        "SELECT a.id, a.identifier, a.title, a.abstract, a.year, a.authors, a.language, \
         c.name AS corpus \
         FROM articles a JOIN corpora c ON c.id = a.corpus_id \
         WHERE a.identifier = ?",
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await?;
    let row = match row {
        Some(row) => row,
        None => return Err(StoreError::not_found("article", identifier)),
    };
    let article_id: String = row.get("id");

    let assignment_rows = sqlx::query(
        "SELECT at.rank, at.value, t.id AS topic_id, t.topic_index, t.keyphrase \
         FROM article_topics at \
         JOIN topics t ON t.id = at.topic_id \
         JOIN models m ON m.id = t.model_id \
         WHERE at.article_id = ? AND m.is_main = 1 \
         ORDER BY at.rank ASC",
    )
    .bind(&article_id)
    .fetch_all(pool)
    .await?;

    let mut topics = Vec::with_capacity(assignment_rows.len());
    for assignment in &assignment_rows {
        let topic_id: String = assignment.get("topic_id");
        let term_rows = sqlx::query(
            "SELECT te.string FROM topic_terms tt \
             JOIN terms te ON te.id = tt.term_id \
             WHERE tt.topic_id = ? \
             ORDER BY tt.value DESC, te.string ASC LIMIT 5",
        )
        .bind(&topic_id)
        .fetch_all(pool)
        .await?;
        topics.push(TopicAssignment {
            rank: assignment.get("rank"),
            topic_index: assignment.get("topic_index"),
            keyphrase: assignment.get("keyphrase"),
            value: assignment.get("value"),
            top_terms: term_rows.iter().map(|r| r.get("string")).collect(),
        });
    }

    let error: Option<String> =
        sqlx::query_scalar("SELECT error_description FROM reported_errors WHERE article_id = ?")
            .bind(&article_id)
            .fetch_optional(pool)
            .await?;

    Ok(ArticleView {
        identifier: row.get("identifier"),
        title: row.get("title"),
        abstract_text: row.get("abstract"),
        year: row.get("year"),
        authors: row.get("authors"),
        language: row.get("language"),
        corpus: row.get("corpus"),
        topics,
        error,
    })
}

/// CLI entry point for `article`.
pub async fn run_article(config: &Config, identifier: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let article = get_article(&pool, identifier).await?;

    println!("--- Article ---");
    println!("identifier: {}", article.identifier);
    println!("title:      {}", article.title);
    if let Some(year) = article.year {
        println!("year:       {}", year);
    }
    if !article.authors.is_empty() {
        println!("authors:    {}", article.authors);
    }
    if !article.language.is_empty() {
        println!("language:   {}", article.language);
    }
    println!("corpus:     {}", article.corpus);
    println!();

    println!("--- Abstract ---");
    println!("{}", article.abstract_text);
    println!();

    if let Some(error) = &article.error {
        println!("--- Analysis error ---");
        println!("{}", error);
    } else if article.topics.is_empty() {
        println!("--- Topics ---");
        println!("(not analyzed)");
    } else {
        println!("--- Topics ---");
        for topic in &article.topics {
            let label = if topic.keyphrase.is_empty() {
                format!("topic {}", topic.topic_index)
            } else {
                format!("topic {} ({})", topic.topic_index, topic.keyphrase)
            };
            println!("{}. [{:.5}] {}", topic.rank, topic.value, label);
            println!("    terms: {}", topic.top_terms.join(", "));
        }
    }

    pool.close().await;
    Ok(())
}
