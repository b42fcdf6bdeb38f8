//! Nearest-ancestor descriptor search.

use std::path::{Path, PathBuf};
use tracing::trace;

/// Find `filename` in `start` or the closest ancestor directory that has it.
///
/// `filename` may contain several components (`node_modules/base/package.prototype.json`);
/// it is joined to each candidate directory as-is. Relative starting paths are
/// made absolute against the current directory first. Returns `None` once the
/// filesystem root has been tried.
pub fn locate(start: &Path, filename: impl AsRef<Path>) -> Option<PathBuf> {
    let filename = filename.as_ref();
    let start = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());

    for dir in start.ancestors() {
        let candidate = dir.join(filename);
        trace!(candidate = %candidate.display(), "Checking for descriptor");
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_in_start_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), "{}").unwrap();

        let found = locate(temp.path(), "package.json").unwrap();
        assert_eq!(found, temp.path().join("package.json"));
    }

    #[test]
    fn test_locate_walks_upward() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("b").join("c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("package.json"), "{}").unwrap();

        let found = locate(&nested, "package.json").unwrap();
        assert_eq!(found, temp.path().join("package.json"));
    }

    #[test]
    fn test_locate_prefers_nearest() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("b").join("c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("package.json"), "{}").unwrap();
        std::fs::write(temp.path().join("b").join("package.json"), "{}").unwrap();

        let found = locate(&nested, "package.json").unwrap();
        assert_eq!(found, temp.path().join("b").join("package.json"));
    }

    #[test]
    fn test_locate_multi_component_filename() {
        let temp = TempDir::new().unwrap();
        let proto_dir = temp.path().join("node_modules").join("base");
        std::fs::create_dir_all(&proto_dir).unwrap();
        std::fs::write(proto_dir.join("package.prototype.json"), "{}").unwrap();
        let nested = temp.path().join("pkg");
        std::fs::create_dir_all(&nested).unwrap();

        let found = locate(&nested, "node_modules/base/package.prototype.json").unwrap();
        assert_eq!(found, proto_dir.join("package.prototype.json"));
    }

    #[test]
    fn test_locate_terminates_when_missing() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("x").join("y");
        std::fs::create_dir_all(&nested).unwrap();

        assert!(locate(&nested, "pinf-descriptor-that-does-not-exist.json").is_none());
    }
}
