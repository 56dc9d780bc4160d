//! On-disk cache of generated units.
//!
//! Each template is stored as one JSON file under the cache directory, at the
//! path of its class name with dots turned into folders. The file records the
//! modification time of the source it was generated from, and is only valid
//! while the source keeps that time.
use crate::{compile::Generated, log::Error};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Extension of cached unit files.
const UNIT_EXTENSION: &str = "gtunit";

/// Errors raised by the on-disk unit cache.
#[derive(Error, Debug)]
pub enum DiskError {
    #[error("cannot access cached unit {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cached unit {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<DiskError> for Error {
    fn from(value: DiskError) -> Self {
        Error::build(value.to_string()).with_help("remove the cache directory to rebuild it")
    }
}

#[derive(Serialize, Deserialize)]
struct CachedUnit {
    /// Modification time of the source the unit was generated from.
    source_modified: Option<SystemTime>,
    generated: Generated,
}

/// Return the file a class is cached in.
pub fn unit_path(root: &Path, class: &str) -> PathBuf {
    let mut path = root.join(class.replace('.', "/"));
    path.set_extension(UNIT_EXTENSION);

    path
}

fn read(path: &Path) -> Result<Option<CachedUnit>, DiskError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(DiskError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| DiskError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Load the unit of a class, if it was generated from a source with the given
/// modification time.
///
/// A unit generated from another version of the source is deleted.
pub fn load(root: &Path, class: &str, modified: Option<SystemTime>) -> Result<Option<Generated>, DiskError> {
    let path = unit_path(root, class);
    let Some(unit) = read(&path)? else {
        return Ok(None);
    };

    if modified.is_some() && unit.source_modified == modified {
        debug!(class, "loaded unit from disk");
        return Ok(Some(unit.generated));
    }

    debug!(class, "removing stale unit from disk");
    fs::remove_file(&path).map_err(|source| DiskError::Io { path, source })?;

    Ok(None)
}

/// Load the unit of a class without checking its source.
pub fn load_precompiled(root: &Path, class: &str) -> Result<Option<Generated>, DiskError> {
    Ok(read(&unit_path(root, class))?.map(|unit| unit.generated))
}

/// Store the unit of a class, stamped with the modification time of its source.
pub fn store(root: &Path, modified: Option<SystemTime>, generated: &Generated) -> Result<(), DiskError> {
    let path = unit_path(root, &generated.class);
    let unit = CachedUnit {
        source_modified: modified,
        generated: generated.clone(),
    };
    let text = serde_json::to_string(&unit).map_err(|source| DiskError::Corrupt {
        path: path.clone(),
        source,
    })?;

    write(&path, &text)?;
    debug!(class = generated.class.as_str(), "stored unit on disk");

    Ok(())
}

/// Write both artifacts of a unit for inspection.
///
/// Failures are logged and otherwise ignored.
pub fn dump(root: &Path, generated: &Generated) {
    for (extension, text) in [("gtstmt", &generated.statements), ("gtexpr", &generated.expressions)] {
        let path = root.join(format!("{}.{extension}", generated.class));
        if let Err(e) = write(&path, text) {
            warn!(error = %e, "cannot dump generated source");
        }
    }
}

fn write(path: &Path, text: &str) -> Result<(), DiskError> {
    let error = |source| DiskError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(error)?;
    }

    fs::write(path, text).map_err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn generated() -> Generated {
        Generated {
            class: "fastergt.generated_templates.GTTemplate_a_html".to_string(),
            statements: "template fastergt.generated_templates.GTTemplate_a_html\n".to_string(),
            expressions: "package fastergt.generated_templates\n".to_string(),
        }
    }

    #[test]
    fn test_unit_path_mirrors_class() {
        let path = unit_path(Path::new("/cache"), "fastergt.generated_templates.GTTemplate_a_html");

        assert_eq!(
            path,
            PathBuf::from("/cache/fastergt/generated_templates/GTTemplate_a_html.gtunit")
        );
    }

    #[test]
    fn test_store_and_load() -> Result<(), Error> {
        let root = TempDir::new()?;
        let modified = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));
        let unit = generated();

        store(root.path(), modified, &unit)?;

        assert_eq!(load_precompiled(root.path(), &unit.class)?, Some(unit.clone()));
        assert_eq!(load(root.path(), &unit.class, modified)?, Some(unit));

        Ok(())
    }

    #[test]
    fn test_stale_unit_is_removed() -> Result<(), Error> {
        let root = TempDir::new()?;
        let unit = generated();
        store(root.path(), Some(SystemTime::UNIX_EPOCH), &unit)?;

        let changed = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(5));

        assert_eq!(load(root.path(), &unit.class, changed)?, None);
        assert!(!unit_path(root.path(), &unit.class).exists());

        Ok(())
    }

    #[test]
    fn test_corrupt_unit() -> Result<(), Error> {
        let root = TempDir::new()?;
        let path = unit_path(root.path(), "fastergt.generated_templates.GTTemplate_b_html");
        write(&path, "{ not json")?;

        let result = load(root.path(), "fastergt.generated_templates.GTTemplate_b_html", None);

        assert!(matches!(result, Err(DiskError::Corrupt { .. })));

        Ok(())
    }

    #[test]
    fn test_dump() -> Result<(), Error> {
        let root = TempDir::new()?;
        let unit = generated();
        dump(root.path(), &unit);

        let statements = fs::read_to_string(root.path().join(format!("{}.gtstmt", unit.class)))?;

        assert_eq!(statements, unit.statements);
        assert!(root.path().join(format!("{}.gtexpr", unit.class)).exists());

        Ok(())
    }
}
