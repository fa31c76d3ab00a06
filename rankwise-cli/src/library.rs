/// Library file persistence: the engine state as pretty JSON on disk.
use rankwise_core::engine::LibraryState;
use std::path::Path;
use tracing::debug;

use crate::bail;

/// Load the library from `path`. A missing file is an empty library.
pub fn load_library(path: &Path) -> LibraryState {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse library at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => LibraryState::default(),
        Err(e) => bail(format!("Failed to read library at {}: {e}", path.display())),
    }
}

/// Write the library to `path`, creating parent directories as needed.
/// Writes to a sibling temp file first so a crash never leaves a half-written library.
pub fn save_library(path: &Path, state: &LibraryState) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    let json = serde_json::to_string_pretty(state)
        .unwrap_or_else(|e| bail(format!("Failed to serialize library: {e}")));

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .unwrap_or_else(|e| bail(format!("Failed to write library to {}: {e}", tmp.display())));
    std::fs::rename(&tmp, path)
        .unwrap_or_else(|e| bail(format!("Failed to replace library at {}: {e}", path.display())));
    debug!(path = %path.display(), records = state.records.len(), "saved library");
}
