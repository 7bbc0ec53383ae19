//! On-disk layout of a collection.

use std::path::{Path, PathBuf};
use tessera_core::config::STATE_DIR;

/// Directory holding a collection's index and manifest.
pub fn collection_dir(workspace: &Path, collection: &str) -> PathBuf {
    workspace.join(STATE_DIR).join(collection)
}

/// SQLite index for a collection.
pub fn index_path(workspace: &Path, collection: &str) -> PathBuf {
    collection_dir(workspace, collection).join("index.sqlite")
}

/// JSONL source manifest for a collection.
pub fn sources_path(workspace: &Path, collection: &str) -> PathBuf {
    collection_dir(workspace, collection).join("sources.jsonl")
}
