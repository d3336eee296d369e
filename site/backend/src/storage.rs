use std::path::Path;

use crate::error::{DashboardError, Result};

pub const DEFAULT_DATA_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/heat_map.parquet");

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}

// read_parquet expands these as globs
const GLOB_CHARS: [char; 4] = ['*', '?', '[', ']'];

/// Fails with `DataUnavailable` unless `path` is a non-empty file whose
/// name DuckDB will not treat as a glob pattern.
pub fn ensure_data_file(path: &Path) -> Result<()> {
    if path.to_string_lossy().contains(GLOB_CHARS) {
        return Err(DashboardError::DataUnavailable {
            path: path.to_path_buf(),
            message: "path contains glob characters (* ? [ ])".to_string(),
        });
    }
    if file_present_nonempty(path) {
        Ok(())
    } else {
        Err(DashboardError::DataUnavailable {
            path: path.to_path_buf(),
            message: "file missing or empty".to_string(),
        })
    }
}

pub fn sql_quote_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.parquet");
        assert!(!file_present_nonempty(&path));
        assert!(matches!(
            ensure_data_file(&path),
            Err(DashboardError::DataUnavailable { .. })
        ));
    }

    #[test]
    fn empty_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        std::fs::write(&path, b"").unwrap();
        assert!(ensure_data_file(&path).is_err());
        std::fs::write(&path, b"PAR1").unwrap();
        assert!(ensure_data_file(&path).is_ok());
    }

    #[test]
    fn glob_characters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["heat*.parquet", "heat?.parquet", "heat[1].parquet"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"PAR1").unwrap();
            assert!(
                matches!(
                    ensure_data_file(&path),
                    Err(DashboardError::DataUnavailable { .. })
                ),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(sql_quote_path(Path::new("/tmp/o'brien.parquet")), "/tmp/o''brien.parquet");
    }
}
