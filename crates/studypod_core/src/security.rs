//! crates/studypod_core/src/security.rs
//!
//! Name and path sanitisation for everything that ends up on disk.
//! User-supplied names never reach the filesystem without passing through here.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

const MAX_FILENAME_LEN: usize = 255;
const MAX_NOTEBOOK_NAME_LEN: usize = 100;
const MAX_USERNAME_LEN: usize = 64;

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Reduces an uploaded file name to a safe basename.
pub fn sanitize_filename(name: &str) -> PortResult<String> {
    // Only the last path component survives, whatever the separator.
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();

    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    let mut cleaned = cleaned
        .trim()
        .trim_matches('.')
        .trim()
        .to_string();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return Err(PortError::InvalidInput(format!(
            "file name '{}' has no usable characters",
            name.escape_debug()
        )));
    }

    let stem = cleaned.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if WINDOWS_RESERVED.contains(&stem.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.chars().count() > MAX_FILENAME_LEN {
        cleaned = truncate_keeping_extension(&cleaned, MAX_FILENAME_LEN);
    }
    Ok(cleaned)
}

fn truncate_keeping_extension(name: &str, max: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if ext.chars().count() < max / 2 => {
            let keep = max - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{}.{}", stem, ext)
        }
        _ => name.chars().take(max).collect(),
    }
}

/// Keeps letters, digits, spaces and hyphens; collapses runs of whitespace.
pub fn sanitize_notebook_name(name: &str) -> PortResult<String> {
    let filtered: String = name
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-')
        .collect();
    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_NOTEBOOK_NAME_LEN).collect();
    let result = truncated.trim_end().to_string();

    if result.is_empty() || result.chars().all(|c| c == '-') {
        return Err(PortError::InvalidInput(
            "notebook name must contain letters or digits".to_string(),
        ));
    }
    Ok(result)
}

/// Lower-cases a username and checks it against `[a-z0-9-_]`.
///
/// Anything else is refused rather than rewritten, so that two distinct names
/// such as `john.doe` and `john_doe` can never share a data directory.
pub fn sanitize_username(name: &str) -> PortResult<String> {
    let cleaned = name.trim().to_lowercase();
    if cleaned.is_empty() {
        return Err(PortError::InvalidInput("username must not be empty".to_string()));
    }
    if cleaned.chars().count() > MAX_USERNAME_LEN {
        return Err(PortError::InvalidInput(format!(
            "username is longer than {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if let Some(bad) = cleaned
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '-' | '_'))
    {
        return Err(PortError::InvalidInput(format!(
            "username may only contain letters, digits, '-' and '_', found {:?}",
            bad
        )));
    }
    Ok(cleaned)
}

/// Resolves `path` (following symlinks) and checks it stays inside `allowed_root`.
///
/// Paths that do not exist yet are resolved through their nearest existing ancestor.
pub fn validate_path(path: &Path, allowed_root: &Path) -> PortResult<PathBuf> {
    let root = allowed_root
        .canonicalize()
        .map_err(|e| PortError::InvalidInput(format!("invalid root {:?}: {}", allowed_root, e)))?;
    let resolved = resolve_lenient(path)?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(PortError::InvalidInput(format!(
            "path {:?} escapes the allowed directory {:?}",
            path, root
        )))
    }
}

fn resolve_lenient(path: &Path) -> PortResult<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Ok(resolved);
    }
    let parent = path
        .parent()
        .ok_or_else(|| PortError::InvalidInput(format!("cannot resolve {:?}", path)))?;
    let name = path
        .file_name()
        .ok_or_else(|| PortError::InvalidInput(format!("cannot resolve {:?}", path)))?;
    Ok(resolve_lenient(parent)?.join(name))
}

/// A fresh random (v4) notebook id.
pub fn generate_notebook_id() -> Uuid {
    Uuid::new_v4()
}
