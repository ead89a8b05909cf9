//! # topicdb
//!
//! A topic-model registry and corpus explorer backed by SQLite.
//!
//! topicdb materializes trained LDA models into a normalized relational
//! store (topics, shared vocabulary terms, term weights), loads document
//! corpora next to them, records externally inferred per-article topic
//! assignments, and keeps dense topic-pair comparison tables between
//! models. Articles are searchable through an FTS5 index with titles
//! weighted above abstracts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │  Artifacts    │──▶│   Engines      │──▶│  SQLite    │
//! │ model/corpus │   │ ingest/corpus │   │ rows+FTS5 │
//! │ matrix/dumps │   │ compare/assign│   └────┬──────┘
//! └──────────────┘   └───────┬───────┘        │
//!                            │ progress        ▼
//!                            ▼            ┌──────────┐
//!                       ┌─────────┐       │   CLI    │
//!                       │ stderr  │       │ (topicdb)│
//!                       └─────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! topicdb init                                  # create database
//! topicdb model create nips-k100 model.json -N 50 --main
//! topicdb corpus load dblp "DBLP citation network" dump.jsonl
//! topicdb assign -i assignments.jsonl -e failures.jsonl
//! topicdb compare add matrix.json k100-vs-k200 score nips-k100 nips-k200
//! topicdb search "neural networks"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`artifact`] | Model and comparison-matrix artifacts |
//! | [`reader`] | Corpus document readers |
//! | [`ingest`] | Topic-model ingestion pipeline |
//! | [`registry`] | Model lifecycle management |
//! | [`corpus`] | Corpus ingestion and management |
//! | [`compare`] | Inter-model topic comparisons |
//! | [`assign`] | Article topic assignment loading |
//! | [`search`] | Article full-text search |
//! | [`article`] | Article retrieval |
//! | [`progress`] | Progress reporting |
//! | [`error`] | Typed store failures |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod article;
pub mod artifact;
pub mod assign;
pub mod compare;
pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod reader;
pub mod registry;
pub mod search;
pub mod slug;
pub mod stats;
