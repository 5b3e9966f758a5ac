use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the directory holding the button/item template images.
///
/// Prefers `<exe_dir>/assets/`; falls back to `./assets/` so running
/// via `cargo run` from a checkout still finds the bundled templates.
pub fn get_assets_dir() -> PathBuf {
    let next_to_exe = get_exe_dir().join("assets");
    if next_to_exe.is_dir() {
        return next_to_exe;
    }
    PathBuf::from("assets")
}

/// Returns the run-history directory: `<exe_dir>/ShopRefreshHistory/`
pub fn get_history_dir() -> PathBuf {
    get_exe_dir().join("ShopRefreshHistory")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_history_dir())?;
    Ok(())
}
