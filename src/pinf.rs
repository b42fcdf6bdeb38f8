//! Effective configuration of a module within a program.
//!
//! [`Pinf`] ties the pieces together: it locates the module's `package.json`,
//! runs the merge pipeline, derives the module identity, fills in the path set
//! and extracts the namespace-scoped config and env. The result is an
//! immutable [`EffectiveConfig`]; resolving again recomputes it from disk.
//!
//! ```no_run
//! use pinf_config::{ModuleRef, Pinf};
//! use serde_json::json;
//!
//! let pinf = Pinf::discover();
//! let module = pinf.resolve(ModuleRef::dir("./services/api"), None)?;
//! let config = module.config(json!({"port": 8080}));
//! let pidfile = module.path("pid", "", "api.pid")?;
//! # Ok::<(), pinf_config::PinfError>(())
//! ```

use crate::config::{
    DescriptorSource, EnvSnapshot, LoaderOptions, MergePipeline, ModuleIdentity, NamespaceSeed,
    ProgramOptions, SourcePaths, deep_merge, extract_namespace, locate,
};
use crate::error::{PinfError, PinfResult};
use crate::paths::{PathKind, PathSet};
use crate::registry::{Instance, InstanceFactory, InstanceKey, InstanceRegistry};
use anyhow::Context;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Descriptor located upward from the package path.
pub const PACKAGE_DESCRIPTOR: &str = "package.json";

/// Identity and paths a caller fixes before resolution.
///
/// Unset fields are derived; set ones are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSeed {
    pub uid: Option<String>,
    pub iid: Option<String>,
    pub ns: NamespaceSeed,
    pub paths: BTreeMap<PathKind, PathBuf>,
}

/// The module being configured: its package directory, or a file inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRef {
    pub dirname: Option<PathBuf>,
    pub filename: Option<PathBuf>,
    pub seed: ModuleSeed,
}

impl ModuleRef {
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            dirname: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            filename: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.seed.uid = Some(uid.into());
        self
    }

    pub fn with_iid(mut self, iid: impl Into<String>) -> Self {
        self.seed.iid = Some(iid.into());
        self
    }

    pub fn with_namespaces(mut self, ns: NamespaceSeed) -> Self {
        self.seed.ns = ns;
        self
    }

    /// Pin one directory. `package`, `program` and `runtime` always come
    /// from the program options and are ignored here.
    pub fn with_path(mut self, kind: PathKind, path: impl Into<PathBuf>) -> Self {
        self.seed.paths.insert(kind, path.into());
        self
    }

    /// `dirname`, else the directory holding `filename`.
    pub fn package_path(&self) -> PinfResult<PathBuf> {
        if let Some(dir) = &self.dirname {
            return Ok(dir.clone());
        }
        self.filename
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .ok_or_else(|| PinfError::configuration("Cannot determine package path."))
    }
}

impl From<&Path> for ModuleRef {
    fn from(path: &Path) -> Self {
        ModuleRef::dir(path)
    }
}

impl From<PathBuf> for ModuleRef {
    fn from(path: PathBuf) -> Self {
        ModuleRef::dir(path)
    }
}

impl From<&str> for ModuleRef {
    fn from(path: &str) -> Self {
        ModuleRef::dir(path)
    }
}

/// Resolver for one program.
#[derive(Debug, Clone)]
pub struct Pinf {
    options: ProgramOptions,
    loader: LoaderOptions,
    env: EnvSnapshot,
}

impl Pinf {
    /// Resolver for `options`, substituting from the current process environment.
    pub fn for_program(options: ProgramOptions) -> Self {
        Self {
            options,
            loader: LoaderOptions::discover(),
            env: EnvSnapshot::capture(),
        }
    }

    /// Resolver for the program described by `PINF_*` and the current directory.
    pub fn discover() -> Self {
        Self::for_program(ProgramOptions::discover())
    }

    pub fn with_loader_options(mut self, loader: LoaderOptions) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the base substitution snapshot.
    pub fn with_env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    pub fn options(&self) -> &ProgramOptions {
        &self.options
    }

    pub fn loader_options(&self) -> &LoaderOptions {
        &self.loader
    }

    /// Base snapshot plus the `PINF_*` values these options resolve to.
    pub fn snapshot(&self) -> EnvSnapshot {
        let mut env = self.env.clone();
        for (name, value) in self.options.env_entries() {
            env.set(name, value);
        }
        env
    }

    /// Resolve the effective configuration of `module`, optionally narrowed to
    /// namespace `ns`.
    pub fn resolve(&self, module: impl Into<ModuleRef>, ns: Option<&str>) -> PinfResult<EffectiveConfig> {
        let module = module.into();
        let package_path = module.package_path()?;
        let package_descriptor =
            locate(&package_path, PACKAGE_DESCRIPTOR).ok_or_else(|| PinfError::NotFound {
                filename: PACKAGE_DESCRIPTOR.to_string(),
                start: package_path.clone(),
            })?;

        let sources = SourcePaths::new(&package_descriptor, &self.options);
        let merged = MergePipeline::new(self.loader.clone(), self.snapshot()).resolve(&sources)?;
        let descriptor = merged.descriptor;

        let seed = &module.seed;
        let package_dir = package_descriptor.parent().unwrap_or_else(|| Path::new(""));
        let identity = ModuleIdentity::derive(
            seed.uid.as_deref(),
            seed.iid.as_deref(),
            &seed.ns,
            merged.package_uid.as_deref(),
            package_dir,
        );

        let mut fixed = BTreeMap::from([
            (PathKind::Package, package_path),
            (PathKind::Program, self.options.program.clone()),
            (PathKind::Runtime, self.options.runtime()),
        ]);
        for (kind, path) in &seed.paths {
            if !kind.is_fixed() {
                fixed.insert(*kind, path.clone());
            }
        }
        let paths = PathSet::resolve(&descriptor, &identity, fixed, &package_descriptor);

        let values = extract_namespace(&descriptor, &identity, ns);
        let credentials = match descriptor.get("credentials") {
            Some(credentials @ Value::Object(_)) => credentials.clone(),
            _ => Value::Object(Map::new()),
        };
        let main = descriptor.get("main").and_then(Value::as_str).map(str::to_string);

        info!(
            uid = %identity.uid,
            iid = %identity.iid,
            ns = ns.unwrap_or(&identity.ns.config),
            package = %package_descriptor.display(),
            "Resolved module configuration"
        );

        Ok(EffectiveConfig {
            identity,
            paths,
            config: values.config,
            env: values.env,
            credentials,
            main,
            descriptor,
            sources: merged.loaded,
        })
    }
}

/// Module-resolution subsystem a resolved module delegates `resolve` and
/// `require` to.
pub trait ModuleResolver {
    type Module;

    /// Resolve `id` from within the package at `package` to a file.
    fn resolve(&self, package: &Path, id: &str) -> anyhow::Result<PathBuf>;

    /// Resolve and load `id` from within the package at `package`.
    fn require(&self, package: &Path, id: &str) -> anyhow::Result<Self::Module>;
}

/// Resolved configuration of one module. Read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    identity: ModuleIdentity,
    paths: PathSet,
    config: Value,
    env: Value,
    credentials: Value,
    main: Option<String>,
    descriptor: Value,
    sources: Vec<(DescriptorSource, PathBuf)>,
}

impl EffectiveConfig {
    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    pub fn env(&self) -> &Value {
        &self.env
    }

    /// `credentials` of the effective descriptor, `{}` when absent.
    pub fn credentials(&self) -> &Value {
        &self.credentials
    }

    pub fn main(&self) -> Option<&str> {
        self.main.as_deref()
    }

    /// The full effective descriptor.
    pub fn descriptor(&self) -> &Value {
        &self.descriptor
    }

    /// Descriptors that contributed, in merge order.
    pub fn sources(&self) -> &[(DescriptorSource, PathBuf)] {
        &self.sources
    }

    /// Namespace config deep-merged with `extra`, plus a `pinf` block
    /// describing the module (uid, iid, ns, paths, main).
    pub fn config(&self, extra: Value) -> Value {
        let mut config = match extra {
            Value::Null => self.config.clone(),
            extra => deep_merge(self.config.clone(), extra),
        };
        if let Value::Object(map) = &mut config {
            map.insert("pinf".to_string(), self.pinf_block());
        }
        config
    }

    fn pinf_block(&self) -> Value {
        json!({
            "uid": self.identity.uid,
            "iid": self.identity.iid,
            "ns": self.identity.ns,
            "paths": self.paths,
            "main": self.main,
        })
    }

    /// See [`PathSet::path`].
    pub fn path(
        &self,
        kind: &str,
        subpath: impl AsRef<Path>,
        filename: impl AsRef<Path>,
    ) -> PinfResult<PathBuf> {
        self.paths.path(kind, subpath, filename)
    }

    fn package_path(&self) -> &Path {
        self.paths.get(PathKind::Package).unwrap_or_else(|| Path::new("."))
    }

    pub fn resolve<R>(&self, resolver: &R, id: &str) -> anyhow::Result<PathBuf>
    where
        R: ModuleResolver + ?Sized,
    {
        let package = self.package_path();
        resolver
            .resolve(package, id)
            .with_context(|| format!("Failed to resolve '{id}' from '{}'", package.display()))
    }

    pub fn require<R>(&self, resolver: &R, id: &str) -> anyhow::Result<R::Module>
    where
        R: ModuleResolver + ?Sized,
    {
        let package = self.package_path();
        resolver
            .require(package, id)
            .with_context(|| format!("Failed to require '{id}' from '{}'", package.display()))
    }

    /// Registry key of this module: runtime descriptor plus `uid:iid`.
    pub fn instance_key(&self) -> InstanceKey {
        let runtime = self
            .paths
            .get(PathKind::Runtime)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        InstanceKey::new(runtime, &self.identity.uid, &self.identity.iid)
    }

    /// The one instance of this module in `registry`, constructed from
    /// `config(extra)` on first use.
    pub async fn singleton<T, F>(
        &self,
        registry: &InstanceRegistry<T>,
        factory: &F,
        extra: Value,
    ) -> anyhow::Result<Arc<T>>
    where
        T: Instance,
        F: InstanceFactory<T> + ?Sized,
    {
        registry
            .get_or_construct(self.instance_key(), self.config(extra), factory)
            .await
    }
}

/// [`PathSet::path`] for a config object produced by [`EffectiveConfig::config`].
///
/// Fails with a configuration error when `config` has no `pinf.paths` block.
pub fn path_in_config(
    config: &Value,
    kind: &str,
    subpath: impl AsRef<Path>,
    filename: impl AsRef<Path>,
) -> PinfResult<PathBuf> {
    let paths = config
        .get("pinf")
        .and_then(|pinf| pinf.get("paths"))
        .ok_or_else(|| PinfError::configuration("`options` does not contain a `pinf` property."))?;
    let paths: PathSet = serde_json::from_value(paths.clone())
        .map_err(|e| PinfError::configuration(format!("Invalid `pinf.paths`: {e}")))?;
    paths.path(kind, subpath, filename)
}

/// Run `program`, mapping success to exit code 0 and any error to 1.
pub fn run<F>(program: F) -> ExitCode
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match program() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Program failed");
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
