use std::path::{Path, PathBuf};

/// Application-level constants
pub const APP_NAME: &str = "FreightDesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest file intake accepts (100 MB)
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Where new uploads live until a reviewer files them.
pub const NEW_DOCUMENTS_FOLDER: &str = "Documents/New Documents";

/// Get the application data directory
/// ~/FreightDesk/ on all platforms; the working directory when no home is known
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Root of the filesystem blob store under `data_dir`
pub fn blobs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("blobs")
}

/// SQLite database file under `data_dir`
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("freightdesk.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "freightdesk_lib=debug,info"
    } else {
        "freightdesk_lib=info,warn"
    }
}
