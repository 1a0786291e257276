//! vidsim CLI entry point

use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vidsim::{
    commands::{
        cmd_health, cmd_init, cmd_list_runs, cmd_list_videos, cmd_run_info, cmd_search,
        cmd_status, cmd_video_info, parse_vector, print_ingest_summary, print_init_summary,
        print_run, print_runs, print_search_results, print_status, print_video, print_videos,
        resolve_query, IngestOptions, IngestService, InitOptions, QueryInput,
    },
    config::Config,
    error::{Error, Result},
    features::create_extractor,
    meta::MetaDb,
    progress::LogWriterFactory,
    store::{QdrantStore, VectorIndex},
};

#[derive(Parser)]
#[command(name = "vidsim")]
#[command(version, about = "Video frame similarity search backed by Qdrant", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "VIDSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit log lines as JSON objects
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize vidsim configuration, storage and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,

        /// Do not contact Qdrant
        #[arg(long)]
        offline: bool,
    },

    /// Sample a video, extract frame features and index them
    Ingest {
        /// Video file (mp4, avi, mov by default)
        path: PathBuf,

        /// Seconds between sampled frames
        #[arg(short, long)]
        interval: Option<f64>,

        /// Filename to record instead of the source file name
        #[arg(long)]
        name: Option<String>,
    },

    /// Find frames similar to a feature vector or an example image
    #[command(group(
        ArgGroup::new("query")
            .required(true)
            .args(["vector", "vector_file", "image"]),
    ))]
    Search {
        /// Feature vector as a JSON array
        #[arg(long)]
        vector: Option<String>,

        /// File containing the feature vector as a JSON array
        #[arg(long)]
        vector_file: Option<PathBuf>,

        /// Image whose colour features are used as the query
        #[arg(long)]
        image: Option<PathBuf>,

        /// Number of results (defaults to query.default_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Check that the vector store is reachable and the collection exists
    Health,

    /// Show system status
    Status,

    /// List ingested videos
    Videos {
        /// Show a single video
        id: Option<String>,
    },

    /// List ingestion runs, newest first
    Runs {
        /// Show a single run
        id: Option<String>,

        /// Maximum number of runs to list
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Manage Qdrant vector database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// Database management actions
#[derive(Subcommand)]
enum DbAction {
    /// Initialize/create the Qdrant collection
    Init,

    /// Show Qdrant collection status
    Status,

    /// Reset the collection (delete all vectors and recreate)
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (plain, json) = if cli.log_json {
        (
            None,
            Some(fmt::layer().json().with_writer(LogWriterFactory::default())),
        )
    } else {
        (
            Some(fmt::layer().with_writer(LogWriterFactory::default())),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(plain)
        .with(json)
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "vidsim", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest {
            path,
            interval,
            name,
        } => {
            let db = open_db(&config).await?;
            let service = IngestService::connect(&config, db, !cli.json).await?;
            let summary = service
                .ingest_file(
                    &path,
                    IngestOptions {
                        interval,
                        filename: name,
                    },
                )
                .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_ingest_summary(&summary);
            }
        }

        Commands::Search {
            vector,
            vector_file,
            image,
            top_k,
        } => {
            let input = match (vector, vector_file, image) {
                (Some(raw), _, _) => QueryInput::Vector(parse_vector(&raw)?),
                (_, Some(path), _) => QueryInput::VectorFile(path),
                (_, _, Some(path)) => QueryInput::Image(path),
                _ => {
                    return Err(Error::Config(
                        "one of --vector, --vector-file or --image is required".to_string(),
                    ))
                }
            };
            let extractor = create_extractor(&config);
            let query = resolve_query(input, extractor.as_ref())?;

            let store = QdrantStore::connect(&config).await?;
            let response = cmd_search(&config, &store, query, top_k).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_search_results(&response);
            }
        }

        Commands::Health => {
            let store = QdrantStore::connect(&config).await?;
            let health = cmd_health(&store).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("✓ {}", health.status);
            }
        }

        Commands::Status => {
            let db = open_db(&config).await?;
            let store = QdrantStore::connect(&config).await?;
            let status = cmd_status(&config, &db, &store).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Videos { id } => {
            let db = open_db(&config).await?;
            match id {
                Some(id) => {
                    let video = cmd_video_info(&db, &id).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&video)?);
                    } else {
                        print_video(&video);
                    }
                }
                None => {
                    let videos = cmd_list_videos(&db).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&videos)?);
                    } else {
                        print_videos(&videos);
                    }
                }
            }
        }

        Commands::Runs { id, limit } => {
            let db = open_db(&config).await?;
            match id {
                Some(id) => {
                    let run = cmd_run_info(&db, &id).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&run)?);
                    } else {
                        print_run(&run);
                    }
                }
                None => {
                    let runs = cmd_list_runs(&db, limit).await?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&runs)?);
                    } else {
                        print_runs(&runs);
                    }
                }
            }
        }

        Commands::Db { action } => {
            handle_db_action(&config, action, cli.json).await?;
        }
    }

    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force, offline } = cli.command else {
        unreachable!()
    };

    // A .toml path names the config file; anything else names the base directory
    let (base_dir, config_path) = match cli.config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    };

    let config = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
        offline,
    })
    .await?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "status": "ok",
                "config": config.paths.config_file,
                "database": config.paths.db_file,
            })
        );
    } else {
        print_init_summary(&config);
    }
    Ok(())
}

async fn handle_db_action(config: &Config, action: DbAction, json: bool) -> Result<()> {
    let store = QdrantStore::connect(config).await?;

    match action {
        DbAction::Init => {
            store.ensure_collection().await?;
            if json {
                println!(r#"{{"status": "ok", "message": "Collection initialized"}}"#);
            } else {
                println!("✓ Qdrant collection '{}' initialized", store.collection_name());
            }
        }
        DbAction::Status => match store.get_collection_info().await? {
            Some(info) => {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "exists": true,
                            "points_count": info.points_count,
                            "indexed_vectors_count": info.indexed_vectors_count,
                            "status": info.status,
                        })
                    );
                } else {
                    println!("Qdrant Collection Status:");
                    println!("  Status: {}", info.status);
                    println!("  Points: {}", info.points_count);
                    println!("  Indexed Vectors: {}", info.indexed_vectors_count);
                }
            }
            None => {
                if json {
                    println!(r#"{{"exists": false}}"#);
                } else {
                    println!("Collection does not exist. Run 'vidsim db init' to create it.");
                }
            }
        },
        DbAction::Reset { yes } => {
            if !yes {
                eprintln!("⚠️  This will delete ALL indexed frames!");
                eprintln!("Run with --yes to confirm.");
                std::process::exit(1);
            }
            store.reset_collection().await?;
            if json {
                println!(r#"{{"status": "ok", "message": "Collection reset"}}"#);
            } else {
                println!("✓ Qdrant collection reset (all frames deleted and collection recreated)");
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}

async fn open_db(config: &Config) -> Result<MetaDb> {
    let db = MetaDb::connect(config).await?;
    if !db.is_initialized().await? {
        return Err(Error::NotInitialized);
    }
    Ok(db)
}
