//! Options for locating program descriptors and loading them.

use std::path::{Path, PathBuf};

/// Mode used when `PINF_MODE` is not set.
pub const DEFAULT_MODE: &str = "production";

/// Directory searched for `extends` prototypes when none is configured.
pub const DEFAULT_PACKAGES_DIR: &str = "node_modules";

/// Runtime-state descriptor location relative to the program descriptor's directory.
pub const RUNTIME_DESCRIPTOR: &str = ".rt/program.rt.json";

/// What to boot and in which state.
///
/// Mirrors the `PINF_PROGRAM`, `PINF_PACKAGE` and `PINF_MODE` environment
/// variables, with defaults relative to a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Working directory the defaults are relative to.
    pub cwd: PathBuf,
    /// Path to `program.json` (how to boot).
    pub program: PathBuf,
    /// Path to `package.json` (what to boot).
    pub package: PathBuf,
    /// Selects `program.<mode>.json`.
    pub mode: String,
}

impl ProgramOptions {
    /// Options for a program rooted at `cwd`, ignoring the environment.
    pub fn for_dir(cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self {
            program: cwd.join("program.json"),
            package: cwd.join("package.json"),
            mode: DEFAULT_MODE.to_string(),
            cwd,
        }
    }

    /// Discover options from `PINF_*` variables and the current directory.
    pub fn discover() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::for_dir(cwd).with_overrides(
            std::env::var_os("PINF_PROGRAM").map(PathBuf::from),
            std::env::var_os("PINF_PACKAGE").map(PathBuf::from),
            std::env::var("PINF_MODE").ok(),
        )
    }

    /// Apply explicit overrides; `None` and empty values keep the current setting.
    pub fn with_overrides(
        mut self,
        program: Option<PathBuf>,
        package: Option<PathBuf>,
        mode: Option<String>,
    ) -> Self {
        if let Some(program) = program.filter(|p| !p.as_os_str().is_empty()) {
            self.program = self.cwd.join(program);
        }
        if let Some(package) = package.filter(|p| !p.as_os_str().is_empty()) {
            self.package = self.cwd.join(package);
        }
        if let Some(mode) = mode.filter(|m| !m.is_empty()) {
            self.mode = mode;
        }
        self
    }

    /// Runtime-state descriptor (the state to boot in).
    pub fn runtime(&self) -> PathBuf {
        self.program
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(RUNTIME_DESCRIPTOR)
    }

    /// Mode-specific program descriptor: `program.json` -> `program.<mode>.json`.
    pub fn mode_program(&self) -> PathBuf {
        let stem = self
            .program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program".to_string());
        self.program.with_file_name(format!("{stem}.{}.json", self.mode))
    }

    /// Environment entries describing this program, in snapshot form.
    pub fn env_entries(&self) -> [(&'static str, String); 4] {
        [
            ("PINF_PROGRAM", self.program.to_string_lossy().into_owned()),
            ("PINF_PACKAGE", self.package.to_string_lossy().into_owned()),
            ("PINF_RUNTIME", self.runtime().to_string_lossy().into_owned()),
            ("PINF_MODE", self.mode.clone()),
        ]
    }
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self::discover()
    }
}

/// Descriptor loader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Fail on `$NAME` tokens without a value. When off, they are left as-is.
    pub strict: bool,
    /// Directory searched (nearest ancestor first) for `extends` prototypes.
    pub packages_dir: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            strict: true,
            packages_dir: DEFAULT_PACKAGES_DIR.to_string(),
        }
    }
}

impl LoaderOptions {
    /// Read `PINF_STRICT` and `PINF_PACKAGES_DIR`, falling back to defaults.
    pub fn discover() -> Self {
        let mut options = Self::default();
        if let Ok(strict) = std::env::var("PINF_STRICT") {
            options.strict = parse_flag(&strict).unwrap_or(true);
        }
        if let Ok(dir) = std::env::var("PINF_PACKAGES_DIR")
            && !dir.is_empty()
        {
            options.packages_dir = dir;
        }
        options
    }

    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
