//! Entity schema descriptor files.
//!
//! Schemas can be declared in JSON next to a deployment instead of in a
//! pack's code. Each file matched by the `--entities` glob holds one
//! [`SchemaDescriptor`]:
//!
//! ```json
//! { "name": "Transfer",
//!   "fields": [ { "name": "value", "type": "bigInteger" } ] }
//! ```

use std::path::{Path, PathBuf};

use globwalk::GlobWalkerBuilder;
use tracing::debug;

use cadence_core::error::{IndexerError, IndexerResult};
use cadence_core::schema::{EntitySchema, SchemaDescriptor};

/// Load every descriptor under `base` matching `pattern`, in path order.
pub fn load_descriptors(base: impl AsRef<Path>, pattern: &str) -> IndexerResult<Vec<EntitySchema>> {
    let base = base.as_ref();
    let walker = GlobWalkerBuilder::from_patterns(base, &[pattern])
        .follow_links(true)
        .build()
        .map_err(|e| IndexerError::ConfigError(format!("invalid entities glob {pattern:?}: {e}")))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            IndexerError::ConfigError(format!("cannot walk entities glob {pattern:?}: {e}"))
        })?;
        if entry.path().is_file() {
            files.push(entry.into_path());
        }
    }
    // deterministic file order
    files.sort();

    files.iter().map(|path| load_descriptor(path)).collect()
}

fn load_descriptor(path: &Path) -> IndexerResult<EntitySchema> {
    let config_err = |reason: String| IndexerError::ConfigError(format!("{}: {reason}", path.display()));

    let raw = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
    let descriptor: SchemaDescriptor =
        serde_json::from_str(&raw).map_err(|e| config_err(e.to_string()))?;
    let schema = EntitySchema::try_from(descriptor)?;

    debug!(path = %path.display(), entity = schema.name(), "Loaded entity descriptor");
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::error::DomainError;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_loads_matching_files_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "modules/transfer/transfer.entity.json",
            r#"{"name":"Transfer","fields":[{"name":"block","type":"integer"}]}"#,
        );
        write(
            dir.path(),
            "modules/account/account.entity.json",
            r#"{"name":"Account","fields":[{"name":"balance","type":"bigInteger"}]}"#,
        );
        write(dir.path(), "modules/readme.md", "not a descriptor");

        let schemas = load_descriptors(dir.path(), "modules/**/*.entity.json").unwrap();
        let names: Vec<_> = schemas.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Account", "Transfer"]);
    }

    #[test]
    fn test_no_matches_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_descriptors(dir.path(), "**/*.entity.json").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_descriptor_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.entity.json", "{ not json");

        let err = load_descriptors(dir.path(), "*.entity.json").unwrap_err();
        assert!(matches!(err, IndexerError::ConfigError(ref msg) if msg.contains("bad.entity.json")));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_match_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "ok.entity.json",
            r#"{"name":"Ok","fields":[]}"#,
        );
        std::os::unix::fs::symlink(
            dir.path().join("gone.json"),
            dir.path().join("dangling.entity.json"),
        )
        .unwrap();

        let err = load_descriptors(dir.path(), "*.entity.json").unwrap_err();
        assert!(matches!(err, IndexerError::ConfigError(ref msg) if msg.contains("cannot walk")));
    }

    #[test]
    fn test_invalid_schema_is_a_domain_error() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "dup.entity.json",
            r#"{"name":"Dup","fields":[{"name":"a","type":"string"},{"name":"a","type":"string"}]}"#,
        );

        let err = load_descriptors(dir.path(), "*.entity.json").unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Domain(DomainError::SchemaConflict { .. })
        ));
    }
}
