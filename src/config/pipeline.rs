//! Ordered loading and merging of every descriptor that applies to a package.

use super::env::EnvSnapshot;
use super::identity::{SELF_NAMESPACE, format_uid};
use super::loader::DescriptorLoader;
use super::merge::deep_merge;
use super::types::{LoaderOptions, ProgramOptions};
use crate::error::PinfResult;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Descriptor sources, lowest to highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorSource {
    /// `package.json`
    Package = 0,
    /// `program.json`
    Program = 1,
    /// `.package.json`
    PackagePrivate = 2,
    /// `.program.json`
    ProgramPrivate = 3,
    /// `.rt/program.rt.json`
    Runtime = 4,
    /// `program.<mode>.json`
    Mode = 5,
}

impl DescriptorSource {
    /// Merge order.
    pub const ORDER: [DescriptorSource; 6] = [
        DescriptorSource::Package,
        DescriptorSource::Program,
        DescriptorSource::PackagePrivate,
        DescriptorSource::ProgramPrivate,
        DescriptorSource::Runtime,
        DescriptorSource::Mode,
    ];

    /// Package descriptors get bare `config`/`env` wrapped under `.` and
    /// contribute the package uid.
    pub fn is_package(self) -> bool {
        matches!(self, DescriptorSource::Package | DescriptorSource::PackagePrivate)
    }
}

impl std::fmt::Display for DescriptorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorSource::Package => write!(f, "package"),
            DescriptorSource::Program => write!(f, "program"),
            DescriptorSource::PackagePrivate => write!(f, "package (private)"),
            DescriptorSource::ProgramPrivate => write!(f, "program (private)"),
            DescriptorSource::Runtime => write!(f, "runtime"),
            DescriptorSource::Mode => write!(f, "mode"),
        }
    }
}

/// File paths for each descriptor source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub package: PathBuf,
    pub program: PathBuf,
    pub package_private: PathBuf,
    pub program_private: PathBuf,
    pub runtime: PathBuf,
    pub mode: PathBuf,
}

impl SourcePaths {
    /// Paths for a located package descriptor within a program.
    pub fn new(package_descriptor: &Path, program: &ProgramOptions) -> Self {
        Self {
            package: package_descriptor.to_path_buf(),
            program: program.program.clone(),
            package_private: private_variant(package_descriptor),
            program_private: private_variant(&program.program),
            runtime: program.runtime(),
            mode: program.mode_program(),
        }
    }

    pub fn get(&self, source: DescriptorSource) -> &Path {
        match source {
            DescriptorSource::Package => &self.package,
            DescriptorSource::Program => &self.program,
            DescriptorSource::PackagePrivate => &self.package_private,
            DescriptorSource::ProgramPrivate => &self.program_private,
            DescriptorSource::Runtime => &self.runtime,
            DescriptorSource::Mode => &self.mode,
        }
    }
}

/// `dir/name.json` -> `dir/.name.json`.
pub fn private_variant(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}"))
}

/// Result of one merge pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDescriptor {
    /// The effective descriptor.
    pub descriptor: Value,
    /// uid declared by `.package.json`, else by `package.json`, normalized.
    pub package_uid: Option<String>,
    /// Sources that contributed, in merge order.
    pub loaded: Vec<(DescriptorSource, PathBuf)>,
}

/// Loads the six descriptor sources in precedence order and merges them.
#[derive(Debug, Clone)]
pub struct MergePipeline {
    loader: DescriptorLoader,
}

impl MergePipeline {
    pub fn new(options: LoaderOptions, env: EnvSnapshot) -> Self {
        Self {
            loader: DescriptorLoader::new(options, env),
        }
    }

    /// Substitution source after the loads so far.
    pub fn env(&self) -> &EnvSnapshot {
        self.loader.env()
    }

    /// Load and merge all sources.
    ///
    /// Missing files contribute nothing; any other failure aborts the pass.
    pub fn resolve(&mut self, sources: &SourcePaths) -> PinfResult<MergedDescriptor> {
        let mut descriptor = Value::Object(Map::new());
        let mut package_uid = None;
        let mut loaded = Vec::new();

        for source in DescriptorSource::ORDER {
            let path = sources.get(source);
            let Some(mut document) = self.loader.load(path)? else {
                debug!(source = %source, path = %path.display(), "Skipping absent descriptor");
                continue;
            };

            if source.is_package() {
                wrap_namespace(&mut document, "config", SELF_NAMESPACE);
                wrap_namespace(&mut document, "env", SELF_NAMESPACE);
                if let Some(uid) = document.get("uid").and_then(Value::as_str).and_then(format_uid) {
                    package_uid = Some(uid);
                }
            }

            descriptor = deep_merge(descriptor, document);
            debug!(source = %source, path = %path.display(), "Merged descriptor");
            loaded.push((source, path.to_path_buf()));
        }

        info!(
            package = %sources.package.display(),
            sources = loaded.len(),
            uid = package_uid.as_deref().unwrap_or("-"),
            "Resolved effective descriptor"
        );

        Ok(MergedDescriptor {
            descriptor,
            package_uid,
            loaded,
        })
    }
}

/// Move `obj[property]` to `obj[property][ns]` when present.
pub fn wrap_namespace(obj: &mut Value, property: &str, ns: &str) {
    let Value::Object(map) = obj else {
        return;
    };
    if let Some(value) = map.get_mut(property) {
        let mut wrapped = Map::new();
        wrapped.insert(ns.to_string(), value.take());
        *value = Value::Object(wrapped);
    }
}
