//! Ready-made tool bundles for tooldock servers.
//!
//! Each bundle registers a related set of tools, resources and prompts into
//! a [`Registry`]:
//!
//! - `basics`: `get_current_time`, `add_numbers`.
//! - `files`: `read_file`, `write_file`, `list_files` confined to a documents folder.
//! - `documents`: an in-memory document store with `docs://` resources.
//! - `tasks`: a SQLite task manager with `tasks://` resources and prompts.

/// Clock and arithmetic tools.
pub mod basics;
/// In-memory document store.
pub mod documents;
/// File tools confined to a folder.
pub mod files;
/// SQLite-backed task manager.
pub mod tasks;

pub use documents::DocumentStore;
pub use files::Sandbox;
pub use tasks::{NewTask, Task, TaskFilter, TaskStatus, TaskStore};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tooldock_core::{ToolDockError, ToolDockResult};
use tooldock_registry::Registry;
use tracing::info;

/// Names accepted by [`register_bundle`].
pub const BUNDLES: &[&str] = &["basics", "files", "documents", "tasks"];

/// Where file-backed bundles keep their data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOptions {
    /// Directory holding `tasks.db`.
    pub data_dir: PathBuf,
    /// Root folder for the file tools.
    pub documents_root: PathBuf,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            documents_root: PathBuf::from("documents"),
        }
    }
}

/// Register the bundle called `name`.
pub fn register_bundle(
    registry: &mut Registry,
    name: &str,
    options: &BundleOptions,
) -> ToolDockResult<()> {
    match name {
        "basics" => basics::register(registry)?,
        "files" => files::register(registry, &options.documents_root)?,
        "documents" => documents::register(registry, Arc::new(DocumentStore::with_samples()))?,
        "tasks" => {
            let store = TaskStore::open(&options.data_dir.join("tasks.db"))?;
            tasks::register(registry, Arc::new(store))?;
        }
        other => {
            return Err(ToolDockError::Config(format!(
                "unknown bundle '{other}' (available: {})",
                BUNDLES.join(", ")
            )))
        }
    }
    info!(bundle = %name, "Bundle registered");
    Ok(())
}

/// Register several bundles in order, stopping at the first failure.
pub fn register_bundles(
    registry: &mut Registry,
    names: &[String],
    options: &BundleOptions,
) -> ToolDockResult<()> {
    for name in names {
        register_bundle(registry, name, options)?;
    }
    Ok(())
}
