use std::{env::current_dir, fs::create_dir_all, path::PathBuf};

use tracing::warn;

const APP_DIR: &str = "faultline";

/// Path to the data directory for the pipeline's local artifacts (log sink,
/// diagnostic exports). Falls back to the current directory if the platform
/// data directory cannot be determined.
pub fn data_dir() -> PathBuf {
    let mut path = match dirs::data_dir() {
        Some(dir) => dir,
        None => {
            warn!("Could not determine data directory. Attempting to use current directory.");
            current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    };
    path.push(APP_DIR);
    if !path.exists() {
        if let Err(e) = create_dir_all(&path) {
            warn!("Could not create data directory {}: {}", path.display(), e);
        }
    }
    path
}
