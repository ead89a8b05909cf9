//! # topicdb CLI
//!
//! The `topicdb` binary is the administrative and exploration interface
//! for the topic-model store. It registers trained LDA models, loads
//! document corpora, records inter-model comparisons, bulk-loads article
//! topic assignments, and searches the stored articles.
//!
//! ## Usage
//!
//! ```bash
//! topicdb --config ./config/topicdb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `topicdb init` | Create the SQLite database and run schema migrations |
//! | `topicdb model create <name> <artifact>` | Register a trained model and store its top-N topic terms |
//! | `topicdb model list` | List registered models |
//! | `topicdb model topics <name>` | Show a model's topics with keyphrases and stored terms |
//! | `topicdb model update <name>` | Rename, edit fields, promote to main or demote |
//! | `topicdb model delete <name>` | Delete a model and clean up orphaned terms |
//! | `topicdb model set-keyphrases <name>` | Apply or reset topic keyphrases from a JSON file |
//! | `topicdb corpus load <name> <desc> <files..>` | Bulk-load a JSONL corpus |
//! | `topicdb corpus list` | List loaded corpora |
//! | `topicdb corpus delete <name>` | Delete a corpus and its articles |
//! | `topicdb compare add <matrix> <name> <kind> <m0> <m1>` | Store a dense topic-pair comparison |
//! | `topicdb compare list` | List registered comparisons |
//! | `topicdb compare update <name>` | Edit a comparison's name, description or bounds |
//! | `topicdb compare delete <name>` | Delete a comparison |
//! | `topicdb assign -i <dumps..>` | Load article topic assignments for the main model |
//! | `topicdb search "<query>"` | Search articles (title weighted above abstract) |
//! | `topicdb article <identifier>` | Show one article with its topic assignments |
//! | `topicdb stats` | Database overview |
//!
//! Long-running commands report progress on stderr; `--progress off|human|json`
//! overrides the TTY-based default.

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use topicdb::models::ComparisonKind;
use topicdb::progress::ProgressMode;
use topicdb::{article, assign, compare, config, corpus, ingest, migrate, registry, search, stats};

/// topicdb — a topic-model registry and corpus explorer backed by SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/topicdb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "topicdb",
    about = "topicdb — a topic-model registry and corpus explorer backed by SQLite",
    version,
    long_about = "topicdb materializes trained LDA models into a normalized relational store, \
    loads document corpora next to them, records inter-model topic comparisons and per-article \
    topic assignments, and exposes full-text article search with titles weighted above abstracts."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/topicdb.toml")]
    config: PathBuf,

    /// Progress reporting on stderr: off, human, or json.
    /// Defaults to human when stderr is a TTY.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Register, inspect, update and delete topic models.
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Load, inspect and delete article corpora.
    Corpus {
        #[command(subcommand)]
        action: CorpusAction,
    },

    /// Register and manage inter-model topic comparisons.
    Compare {
        #[command(subcommand)]
        action: CompareAction,
    },

    /// Load article topic assignments produced by an offline inference job.
    ///
    /// Articles that already carry assignments or a reported error are
    /// skipped, so re-running the same dump is a no-op.
    Assign {
        /// JSONL assignment dumps: one {"identifier", "topics": [...]}
        /// object per line.
        #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// JSONL error dumps: one {"identifier", "error"} object per line.
        #[arg(short = 'e', long = "errors", num_args = 1..)]
        errors: Vec<PathBuf>,

        /// Assign against this model instead of the main model.
        #[arg(long)]
        model: Option<String>,

        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search stored articles.
    ///
    /// Full-text match over titles and abstracts, titles weighted higher.
    Search {
        /// The search query string.
        query: String,

        /// Restrict results to one corpus.
        #[arg(long)]
        corpus: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show one article with its main-model topic assignments.
    Article {
        /// The article's external identifier.
        identifier: String,
    },

    /// Show database statistics.
    Stats,
}

/// Model management subcommands.
#[derive(Subcommand)]
enum ModelAction {
    /// Register a trained model from an artifact file.
    ///
    /// Stores the model row, its topics, and the top-N terms of every
    /// topic with their weights. The whole registration is atomic.
    Create {
        /// Unique model name; normalized to slug form.
        name: String,

        /// Path to the model artifact (JSON with vocabulary and weights).
        artifact: PathBuf,

        /// Readable description; defaults to the given name.
        #[arg(short, long)]
        description: Option<String>,

        /// Free text about the training configuration of the model.
        #[arg(short = 't', long)]
        training_context: Option<String>,

        /// Set the new model as the application's main model.
        #[arg(long)]
        main: bool,

        /// Terms stored per topic. Large values trade retrieval
        /// simplicity for storage bloat; no cap is applied.
        #[arg(short = 'N', long = "top-n")]
        top_n: Option<usize>,

        /// Preprocessor name used for custom texts under this model.
        #[arg(short, long)]
        preprocessor: Option<String>,

        /// Vectorize custom texts with tf-idf.
        #[arg(long)]
        tfidf: bool,

        /// Vectorize custom texts with plain bag-of-words (overrides --tfidf).
        #[arg(long)]
        bow: bool,
    },

    /// List registered models.
    List {
        /// Include description, topic counts, paths and flags.
        #[arg(long)]
        detailed: bool,
    },

    /// Show a model's topics with keyphrases and stored terms.
    Topics {
        /// Model name.
        name: String,
    },

    /// Update a model's fields; omitted options are left unchanged.
    Update {
        /// Current model name.
        name: String,

        /// New name; normalized to slug form.
        #[arg(short = 'n', long)]
        new_name: Option<String>,

        /// New description.
        #[arg(short, long)]
        description: Option<String>,

        /// New training context.
        #[arg(short = 't', long)]
        training_context: Option<String>,

        /// Promote this model to the application's main model.
        #[arg(long)]
        main: bool,

        /// Demote this model if it is the main model (ignored with --main).
        #[arg(long)]
        demote: bool,

        /// New preprocessor name.
        #[arg(short, long)]
        preprocessor: Option<String>,

        /// Switch custom-text vectorization to tf-idf.
        #[arg(long)]
        tfidf: bool,

        /// Switch custom-text vectorization to plain bag-of-words.
        #[arg(long)]
        bow: bool,
    },

    /// Delete a model, its topics and weights, and any terms only it used.
    Delete {
        /// Model name.
        name: String,
    },

    /// Apply topic keyphrases from a JSON file, or reset them all.
    ///
    /// The file is a JSON array of {"topic": <index>, "keyphrase": "..."}
    /// objects. Without a file, every keyphrase of the model is reset to
    /// the empty string.
    SetKeyphrases {
        /// Model name.
        name: String,

        /// Path to the keyphrases JSON file.
        #[arg(short = 'k', long)]
        keyphrases: Option<PathBuf>,
    },
}

/// Corpus management subcommands.
#[derive(Subcommand)]
enum CorpusAction {
    /// Bulk-load articles from JSONL corpus files.
    ///
    /// Articles whose identifier already exists anywhere in the store are
    /// skipped silently. The whole load is atomic.
    Load {
        /// Application-wide unique name identifying the corpus.
        name: String,

        /// A readable description for the corpus.
        description: String,

        /// Paths to the corpus files.
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// List loaded corpora.
    List {
        /// Include descriptions, article counts and load dates.
        #[arg(long)]
        detailed: bool,
    },

    /// Delete a corpus and every article loaded under it.
    Delete {
        /// Corpus name.
        name: String,
    },
}

/// Comparison management subcommands.
#[derive(Subcommand)]
enum CompareAction {
    /// Register a comparison between two models from a matrix artifact.
    ///
    /// The matrix must be exactly topics(model_0) × topics(model_1); the
    /// full dense cross product of topic pairs is stored.
    Add {
        /// Path to the comparison matrix artifact (JSON).
        matrix: PathBuf,

        /// Unique comparison name; normalized to slug form.
        name: String,

        /// `score` (higher is more similar) or `distance` (higher is more
        /// different).
        kind: String,

        /// Name of the first model of the pair.
        model_0: String,

        /// Name of the second model of the pair.
        model_1: String,

        /// Readable description; defaults to the given name.
        #[arg(short, long)]
        description: Option<String>,

        /// Lowest value the comparison metric can take.
        #[arg(long = "min")]
        lower_bound: Option<f64>,

        /// Highest value the comparison metric can take.
        #[arg(long = "max")]
        upper_bound: Option<f64>,
    },

    /// List registered comparisons.
    List {
        /// Include kinds, bounds, model pairs and edge counts.
        #[arg(long)]
        detailed: bool,
    },

    /// Update a comparison's name, description or bounds.
    ///
    /// The model pair and the stored values are immutable; delete and
    /// re-add the comparison to change them.
    Update {
        /// Current comparison name.
        name: String,

        /// New name; normalized to slug form.
        #[arg(short = 'n', long)]
        new_name: Option<String>,

        /// New description.
        #[arg(short, long)]
        description: Option<String>,

        /// New lower bound of the comparison metric.
        #[arg(long = "min")]
        lower_bound: Option<f64>,

        /// New upper bound of the comparison metric.
        #[arg(long = "max")]
        upper_bound: Option<f64>,
    },

    /// Delete a comparison and its topic-pair values.
    Delete {
        /// Comparison name.
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mode = match cli.progress.as_deref() {
        None => ProgressMode::default_for_tty(),
        Some("off") => ProgressMode::Off,
        Some("human") => ProgressMode::Human,
        Some("json") => ProgressMode::Json,
        Some(other) => bail!(
            "Unknown progress mode: '{}'. Use off, human, or json.",
            other
        ),
    };
    let reporter = mode.reporter();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Model { action } => match action {
            ModelAction::Create {
                name,
                artifact,
                description,
                training_context,
                main,
                top_n,
                preprocessor,
                tfidf,
                bow,
            } => {
                let req = ingest::NewModel {
                    name,
                    artifact_path: artifact,
                    description,
                    training_context,
                    main,
                    top_n,
                    preprocessor,
                    use_tfidf: !bow && tfidf,
                };
                ingest::run_create(&cfg, req, reporter.as_ref()).await?;
            }
            ModelAction::List { detailed } => {
                registry::run_list(&cfg, detailed).await?;
            }
            ModelAction::Topics { name } => {
                registry::run_topics(&cfg, &name).await?;
            }
            ModelAction::Update {
                name,
                new_name,
                description,
                training_context,
                main,
                demote,
                preprocessor,
                tfidf,
                bow,
            } => {
                let update = registry::ModelUpdate {
                    new_name,
                    description,
                    training_context,
                    set_main: main,
                    demote: !main && demote,
                    preprocessor,
                    use_tfidf: if bow || tfidf { Some(!bow && tfidf) } else { None },
                };
                registry::run_update(&cfg, &name, update).await?;
            }
            ModelAction::Delete { name } => {
                registry::run_delete(&cfg, &name).await?;
            }
            ModelAction::SetKeyphrases { name, keyphrases } => {
                registry::run_set_keyphrases(&cfg, &name, keyphrases.as_deref()).await?;
            }
        },
        Commands::Corpus { action } => match action {
            CorpusAction::Load {
                name,
                description,
                files,
                batch_size,
            } => {
                corpus::run_load(&cfg, files, &name, &description, batch_size, reporter.as_ref())
                    .await?;
            }
            CorpusAction::List { detailed } => {
                corpus::run_list(&cfg, detailed).await?;
            }
            CorpusAction::Delete { name } => {
                corpus::run_delete(&cfg, &name).await?;
            }
        },
        Commands::Compare { action } => match action {
            CompareAction::Add {
                matrix,
                name,
                kind,
                model_0,
                model_1,
                description,
                lower_bound,
                upper_bound,
            } => {
                let kind = match ComparisonKind::parse(&kind) {
                    Some(kind) => kind,
                    None => bail!(
                        "Unknown comparison kind: '{}'. Use score or distance.",
                        kind
                    ),
                };
                let req = compare::NewComparison {
                    name,
                    matrix_path: matrix,
                    kind,
                    model_0,
                    model_1,
                    description,
                    lower_bound,
                    upper_bound,
                };
                compare::run_add(&cfg, req, reporter.as_ref()).await?;
            }
            CompareAction::List { detailed } => {
                compare::run_list(&cfg, detailed).await?;
            }
            CompareAction::Update {
                name,
                new_name,
                description,
                lower_bound,
                upper_bound,
            } => {
                let update = compare::ComparisonUpdate {
                    new_name,
                    description,
                    lower_bound,
                    upper_bound,
                };
                compare::run_update(&cfg, &name, update).await?;
            }
            CompareAction::Delete { name } => {
                compare::run_delete(&cfg, &name).await?;
            }
        },
        Commands::Assign {
            inputs,
            errors,
            model,
            batch_size,
        } => {
            assign::run_assign(&cfg, inputs, errors, model, batch_size, reporter.as_ref()).await?;
        }
        Commands::Search {
            query,
            corpus,
            limit,
        } => {
            search::run_search(&cfg, &query, corpus, limit).await?;
        }
        Commands::Article { identifier } => {
            article::run_article(&cfg, &identifier).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
