//! Well-known directories of a module.
//!
//! Each directory is either fixed before resolution (`package`, `program`,
//! `runtime`, or any path the caller pre-set), declared in the descriptor's
//! `directories` map, or defaulted next to the runtime-state descriptor:
//! `<runtime dir>/<kind>/<ns.filename>`.
//!
//! Paths are pure values; directories are only created when requested
//! through [`PathSet::path`].

use crate::config::ModuleIdentity;
use crate::error::{PinfError, PinfResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Kinds of module directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Package,
    Program,
    Runtime,
    Data,
    Conf,
    Log,
    Pid,
    Cache,
    Tmp,
}

impl PathKind {
    pub const ALL: [PathKind; 9] = [
        PathKind::Package,
        PathKind::Program,
        PathKind::Runtime,
        PathKind::Data,
        PathKind::Conf,
        PathKind::Log,
        PathKind::Pid,
        PathKind::Cache,
        PathKind::Tmp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::Package => "package",
            PathKind::Program => "program",
            PathKind::Runtime => "runtime",
            PathKind::Data => "data",
            PathKind::Conf => "conf",
            PathKind::Log => "log",
            PathKind::Pid => "pid",
            PathKind::Cache => "cache",
            PathKind::Tmp => "tmp",
        }
    }

    /// Set from the program options, never from the descriptor.
    pub fn is_fixed(&self) -> bool {
        matches!(self, PathKind::Package | PathKind::Program | PathKind::Runtime)
    }
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathKind {
    type Err = PinfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PinfError::configuration(format!("Unknown path type '{s}'")))
    }
}

/// Resolved directories of a module. Serializes as a `kind -> path` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathSet {
    paths: BTreeMap<PathKind, PathBuf>,
}

impl PathSet {
    /// Fill every kind missing from `fixed`.
    ///
    /// `directories.<kind>` is resolved against the directory of
    /// `package_descriptor`; otherwise the default lives beside the runtime
    /// descriptor under `<kind>/<ns.filename>`.
    pub fn resolve(
        descriptor: &Value,
        identity: &ModuleIdentity,
        fixed: BTreeMap<PathKind, PathBuf>,
        package_descriptor: &Path,
    ) -> Self {
        let mut paths = fixed;
        let package_dir = package_descriptor.parent().unwrap_or_else(|| Path::new(""));
        let runtime_dir = paths
            .get(&PathKind::Runtime)
            .and_then(|runtime| runtime.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let directories = descriptor.get("directories");

        for kind in PathKind::ALL {
            if paths.contains_key(&kind) {
                continue;
            }
            let declared = directories
                .and_then(|dirs| dirs.get(kind.as_str()))
                .and_then(Value::as_str)
                .filter(|dir| !dir.is_empty());
            let path = match declared {
                Some(dir) => normalize_path_components(&package_dir.join(dir)),
                None => runtime_dir.join(kind.as_str()).join(&identity.ns.filename),
            };
            paths.insert(kind, path);
        }

        Self { paths }
    }

    pub fn get(&self, kind: PathKind) -> Option<&Path> {
        self.paths.get(&kind).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PathKind, &Path)> {
        self.paths.iter().map(|(kind, path)| (*kind, path.as_path()))
    }

    /// `<kind dir>/<subpath>/<filename>`, creating `<kind dir>/<subpath>` if needed.
    ///
    /// Fails with a configuration error when `kind` is not a known path type.
    pub fn path(
        &self,
        kind: &str,
        subpath: impl AsRef<Path>,
        filename: impl AsRef<Path>,
    ) -> PinfResult<PathBuf> {
        self.path_for(kind.parse()?, subpath, filename)
    }

    pub fn path_for(
        &self,
        kind: PathKind,
        subpath: impl AsRef<Path>,
        filename: impl AsRef<Path>,
    ) -> PinfResult<PathBuf> {
        let base = self.get(kind).ok_or_else(|| {
            let package = self
                .get(PathKind::Package)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            PinfError::configuration(format!(
                "Path for type '{kind}' not found for package: {package}"
            ))
        })?;

        let dir = base.join(subpath);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| PinfError::io(&dir, e))?;
            debug!(kind = %kind, dir = %dir.display(), "Created directory");
        }
        Ok(dir.join(filename))
    }
}

/// Normalize path components without requiring the file to exist.
/// Handles `.` and `..` components.
pub(crate) fn normalize_path_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                } else {
                    // Nothing to pop (root or leading `..`), keep it
                    components.push(Component::ParentDir);
                }
            }
            other => components.push(other),
        }
    }

    components.iter().collect()
}
