//! Persistent storage for small client-side blobs.
//!
//! JSON files in the platform-appropriate config directory:
//! - Linux: `~/.config/anochat/`
//! - macOS: `~/Library/Application Support/anochat/`
//! - Windows: `%APPDATA%\anochat\`
//!
//! The embedded web client keeps the same blobs in the host's cloud
//! key-value store; this module is the desktop stand-in.

use serde::{de::DeserializeOwned, Serialize};

use anochat_shared::SearchParams;

/// Storage key for the last-submitted search parameters.
pub const SEARCH_PARAMS_KEY: &str = "search_params";

/// Save a value to persistent storage.
///
/// Returns `true` if the operation succeeded.
pub fn save<T: Serialize>(key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => save_raw(key, &json),
        Err(_) => false,
    }
}

/// Load a value from persistent storage.
///
/// Returns `None` if the key doesn't exist or deserialization fails.
pub fn load<T: DeserializeOwned>(key: &str) -> Option<T> {
    let json = load_raw(key)?;
    serde_json::from_str(&json).ok()
}

/// Remove a value from persistent storage.
pub fn remove(key: &str) {
    if let Some(path) = file_path(key) {
        let _ = std::fs::remove_file(path);
    }
}

/// Cache the last-submitted search parameters for the next session.
pub fn save_search_params(params: &SearchParams) -> bool {
    save(SEARCH_PARAMS_KEY, params)
}

pub fn load_search_params() -> Option<SearchParams> {
    load(SEARCH_PARAMS_KEY)
}

fn config_dir() -> Option<std::path::PathBuf> {
    let app_dir = dirs::config_dir()?.join("anochat");
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir).ok()?;
    }
    Some(app_dir)
}

fn file_path(key: &str) -> Option<std::path::PathBuf> {
    // Sanitize the key to a valid filename
    let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    Some(config_dir()?.join(format!("{safe_key}.json")))
}

fn save_raw(key: &str, value: &str) -> bool {
    let Some(path) = file_path(key) else {
        return false;
    };
    std::fs::write(path, value).is_ok()
}

fn load_raw(key: &str) -> Option<String> {
    let path = file_path(key)?;
    std::fs::read_to_string(path).ok()
}
