//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::store::{QdrantStore, VectorIndex};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Skip creating the Qdrant collection
    pub offline: bool,
}

/// Write default config, create storage directories and the ledger schema
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        offline,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.validate()?;
    config.save()?;

    for dir in [config.video_dir(), config.frame_dir()] {
        std::fs::create_dir_all(&dir)?;
        info!("Created storage directory {:?}", dir);
    }

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    if !offline {
        match QdrantStore::connect(&config).await {
            Ok(store) => match store.ensure_collection().await {
                Ok(_) => info!("Qdrant collection '{}' ready", config.collection_name),
                Err(e) => warn!(
                    "Could not create Qdrant collection: {}. Run 'vidsim db init' later.",
                    e
                ),
            },
            Err(e) => warn!(
                "Could not connect to Qdrant at {}: {}. Make sure Qdrant is running.",
                config.qdrant_url, e
            ),
        }
    }

    Ok(config)
}

/// Print the init summary to console
pub fn print_init_summary(config: &Config) {
    println!("✓ Initialized vidsim at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("Database: {:?}", config.paths.db_file);
    println!("Videos: {:?}", config.video_dir());
    println!("Frames: {:?}", config.frame_dir());
    println!("\nNext steps:");
    println!("  vidsim ingest ./clip.mp4 --interval 1.0   # Sample and index a video");
    println!("  vidsim search --image ./still.jpg          # Find similar frames");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
            offline: true,
        }
    }

    #[tokio::test]
    async fn test_init_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let config = cmd_init(options(&tmp, false)).await.unwrap();

        assert!(config.paths.config_file.exists());
        assert!(config.paths.db_file.exists());
        assert!(config.video_dir().is_dir());
        assert!(config.frame_dir().is_dir());
        assert!(config.is_initialized());

        let db = MetaDb::connect(&config).await.unwrap();
        assert!(db.is_initialized().await.unwrap());

        let reloaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(reloaded.collection_name, config.collection_name);
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false)).await.unwrap();

        let err = cmd_init(options(&tmp, false)).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(cmd_init(options(&tmp, true)).await.is_ok());
    }
}
