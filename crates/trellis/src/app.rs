//! Application context for CLI command execution.
//!
//! [`App`] loads a JSONL dataset directory into an [`InMemoryStore`], reads
//! the engine configuration, and builds an [`Engine`] over the store.
//!
//! # Example
//!
//! ```no_run
//! use trellis::app::App;
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::open(Path::new("./portfolio"), None).await?;
//!     let summary = app.engine().network().snapshot_all().await?.summary();
//!     println!("{} nodes, {} edges", summary.node_count, summary.edge_count);
//!     Ok(())
//! }
//! ```

use crate::clock::SystemClock;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::scheduler::TracingNotifier;
use crate::storage::in_memory::{InMemoryStore, LoadWarning, load_from_jsonl, save_to_jsonl};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration file looked up inside the data directory
pub const CONFIG_FILE_NAME: &str = "trellis.yaml";

/// Application context for CLI operations.
pub struct App {
    store: Arc<InMemoryStore>,
    engine: Engine,
    data_dir: PathBuf,
    warnings: Vec<LoadWarning>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("data_dir", &self.data_dir)
            .field("warnings", &self.warnings.len())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Open a dataset directory.
    ///
    /// The configuration comes from `config_path` when given, otherwise from
    /// [`CONFIG_FILE_NAME`] inside `data_dir` if present, otherwise defaults.
    /// Malformed dataset records are skipped and kept as
    /// [`warnings`](Self::warnings).
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or the configuration is
    /// invalid.
    pub async fn open(data_dir: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::load(path).await?,
            None => {
                let default_path = data_dir.join(CONFIG_FILE_NAME);
                if tokio::fs::try_exists(&default_path).await? {
                    EngineConfig::load(&default_path).await?
                } else {
                    EngineConfig::default()
                }
            }
        };

        let (store, warnings) = load_from_jsonl(data_dir).await?;
        for warning in &warnings {
            tracing::warn!(%warning, "Skipped dataset record");
        }

        let store = Arc::new(store);
        let engine = Engine::new(
            store.clone(),
            store.clone(),
            config,
            Arc::new(SystemClock),
            Arc::new(TracingNotifier),
        )?;

        tracing::debug!(
            dir = %data_dir.display(),
            nodes = store.node_count().await,
            "Opened dataset"
        );

        Ok(Self {
            store,
            engine,
            data_dir: data_dir.to_path_buf(),
            warnings,
        })
    }

    /// The engine over the loaded dataset
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The backing store
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Dataset directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Records skipped while loading
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Write the store back to the dataset directory.
    ///
    /// This should be called after any mutating operations.
    pub async fn save(&self) -> Result<()> {
        save_to_jsonl(&self.store, &self.data_dir).await
    }
}
