//! Discovery of migration units on disk.
//!
//! Units are `<version>_<name>.up.sql` files with an optional matching
//! `<version>_<name>.down.sql`. Anything else in the directory is ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::MigrationUnit;
use crate::errors::MigrationError;

static UNIT_FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)_([A-Za-z0-9][A-Za-z0-9_\-]*)\.(up|down)\.sql$")
        .expect("valid migration file pattern")
});

#[derive(Default)]
struct UnitFiles {
    name: String,
    up: Option<String>,
    down: Option<String>,
}

/// Load every unit in `dir`, sorted by ascending version.
pub fn discover(dir: &Path) -> Result<Vec<MigrationUnit>, MigrationError> {
    let io_error = |source| MigrationError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut units: BTreeMap<i64, UnitFiles> = BTreeMap::new();

    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = UNIT_FILE_PATTERN.captures(file_name) else {
            tracing::debug!(file = %file_name, "Skipping non-migration file");
            continue;
        };

        let version: i64 = caps[1].parse().map_err(|_| {
            MigrationError::Discovery(format!("version of `{}` is out of range", file_name))
        })?;
        let name = &caps[2];
        let sql = fs::read_to_string(&path).map_err(|source| MigrationError::Io {
            path: path.clone(),
            source,
        })?;

        let files = units.entry(version).or_insert_with(|| UnitFiles {
            name: name.to_string(),
            ..UnitFiles::default()
        });
        if files.name != name {
            return Err(MigrationError::Discovery(format!(
                "version {} has conflicting names `{}` and `{}`",
                version, files.name, name
            )));
        }

        let slot = if &caps[3] == "up" {
            &mut files.up
        } else {
            &mut files.down
        };
        if slot.is_some() {
            return Err(MigrationError::Discovery(format!(
                "duplicate {} script for version {}",
                &caps[3], version
            )));
        }
        *slot = Some(sql);
    }

    units
        .into_iter()
        .map(|(version, files)| match files.up {
            Some(up) => Ok(MigrationUnit::new(version, files.name, up, files.down)),
            None => Err(MigrationError::Discovery(format!(
                "migration {}_{} has a down script but no up script",
                version, files.name
            ))),
        })
        .collect()
}
