//! File templates for generated components.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::errors::{AppError, AppResult};

/// Write an empty up/down migration pair into `dir`.
///
/// The version is the UTC timestamp `YYYYMMDDHHMMSS`, so newly generated
/// units always sort after existing ones.
pub fn generate_migration(dir: &Path, name: &str, now: DateTime<Utc>) -> AppResult<(PathBuf, PathBuf)> {
    if !name.is_ascii() {
        return Err(AppError::internal(format!(
            "invalid migration name `{}`: only ASCII letters, digits and separators are allowed",
            name
        )));
    }

    let snake_name = to_snake_case(name);
    if snake_name.is_empty() {
        return Err(AppError::internal(format!("invalid migration name `{}`", name)));
    }

    let stem = format!("{}_{}", now.format("%Y%m%d%H%M%S"), snake_name);
    let up_path = dir.join(format!("{}.up.sql", stem));
    let down_path = dir.join(format!("{}.down.sql", stem));

    let up_content = format!(
        "-- Migration: {name}\n-- Created: {created}\n\n",
        name = snake_name,
        created = now.to_rfc3339()
    );
    let down_content = format!("-- Revert: {name}\n\n", name = snake_name);

    write_new_file(&up_path, &up_content)?;
    write_new_file(&down_path, &down_content)?;

    Ok((up_path, down_path))
}

/// Write `content` to `path`, creating parent directories, never overwriting.
fn write_new_file(path: &Path, content: &str) -> AppResult<()> {
    if path.exists() {
        return Err(AppError::internal(format!("{} already exists", path.display())));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AppError::internal(e.to_string()))?;
    }

    fs::write(path, content).map_err(|e| AppError::internal(e.to_string()))?;

    Ok(())
}

/// Convert to snake_case, folding separators into underscores
fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.trim().chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !result.ends_with('_') {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            result.push(c);
        } else if !result.is_empty() && !result.ends_with('_') {
            result.push('_');
        }
    }
    result.trim_end_matches('_').to_string()
}
