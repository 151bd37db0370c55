pub mod http;

use anyhow::{Context, Result};
use std::path::PathBuf;

pub fn get_leaddesk_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("LEADDESK_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::home_dir()
        .context("Could not determine home directory")?
        .join(".leaddesk"))
}

/// Keep at most `max_chars` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Strip trailing slashes from a base URL so paths can be appended with `/`.
pub fn trim_base_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
