//! Descriptor loading with textual pre-processing.
//!
//! A descriptor is read as text and outlined to find its `env` injection and
//! `extends` inheritance. Declared env entries are fed into the [`EnvSnapshot`],
//! `$NAME` tokens are substituted, `$__DIRNAME` is replaced and the result is parsed.

use super::env::{DIRNAME_TOKEN, EnvSnapshot, escape_json_fragment};
use super::locator::locate;
use super::merge::deep_merge;
use super::types::LoaderOptions;
use crate::error::{PinfError, PinfResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Marker opening an `env` injection directive: `"env": ["<-", "relative/path.json"]`.
pub const INJECT_MARKER: &str = "<-";

/// Loads descriptors, accumulating declared env entries across loads.
#[derive(Debug, Clone)]
pub struct DescriptorLoader {
    options: LoaderOptions,
    env: EnvSnapshot,
    /// Descriptors currently being loaded, outermost first.
    active: Vec<PathBuf>,
}

impl DescriptorLoader {
    pub fn new(options: LoaderOptions, env: EnvSnapshot) -> Self {
        Self {
            options,
            env,
            active: Vec::new(),
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Substitution source as it stands after the loads so far.
    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    pub fn into_env(self) -> EnvSnapshot {
        self.env
    }

    /// Load one descriptor. A missing file yields `Ok(None)`.
    pub fn load(&mut self, path: &Path) -> PinfResult<Option<Value>> {
        if !path.is_file() {
            debug!(path = %path.display(), "Descriptor not present");
            return Ok(None);
        }
        let path = std::path::absolute(path).map_err(|e| PinfError::io(path, e))?;

        if self.active.contains(&path) {
            let chain: Vec<String> = self
                .active
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| p.display().to_string())
                .collect();
            return Err(PinfError::policy(
                &path,
                format!("`extends` cycle detected: {}", chain.join(" -> ")),
            ));
        }

        self.active.push(path.clone());
        let result = self.load_file(&path);
        self.active.pop();
        result.map(Some)
    }

    fn load_file(&mut self, path: &Path) -> PinfResult<Value> {
        let raw = std::fs::read_to_string(path).map_err(|e| PinfError::io(path, e))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("/"));
        let dirname = dir.to_string_lossy();

        // `$__DIRNAME` is spliced in after the `$NAME` pass, so a directory
        // containing `$UPPER` is never read as a variable.
        let outline = match parse_descriptor(path, &raw) {
            Ok(outline) => outline,
            Err(_) => {
                // Bare `$NAME` tokens (outside strings) only parse once expanded.
                let expanded = self.substitute(path, &raw)?;
                parse_descriptor(path, &expanded)?
            }
        };

        let injected_env = match injection_target(outline.get("env")) {
            Some(relative) => {
                let relative = relative.replace(DIRNAME_TOKEN, &dirname);
                Some(self.load_injected_env(path, dir, &relative)?)
            }
            None => None,
        };

        let inherited = match outline.get("extends") {
            Some(extends) => Some(self.load_extends(path, dir, extends)?),
            None => None,
        };

        let declared = match &injected_env {
            Some(injected) => Some((injected, None)),
            None => outline.get("env").map(|env| (env, Some(&*dirname))),
        };
        if let Some((declared, declared_dir)) = declared {
            let absorbed = self.env.absorb_declared(declared, declared_dir);
            if absorbed > 0 {
                debug!(path = %path.display(), absorbed, "Declared env entries added to snapshot");
            }
        }

        let text = self
            .substitute(path, &raw)?
            .replace(DIRNAME_TOKEN, &escape_json_fragment(&dirname));
        let mut document = parse_descriptor(path, &text)?;

        if let Some(inherited) = inherited {
            document = deep_merge(inherited, document);
        }
        if let (Some(env), Value::Object(map)) = (injected_env, &mut document) {
            map.insert("env".to_string(), env);
        }

        debug!(path = %path.display(), "Descriptor loaded");
        Ok(document)
    }

    /// `$NAME` pass over descriptor text, honouring strict mode.
    fn substitute(&self, path: &Path, text: &str) -> PinfResult<String> {
        self.env
            .substitute(text, self.options.strict)
            .map_err(|unset| PinfError::MissingEnvVar {
                name: unset.0,
                path: path.to_path_buf(),
            })
    }

    fn load_injected_env(&mut self, path: &Path, dir: &Path, relative: &str) -> PinfResult<Value> {
        let target = dir.join(relative);
        match self.load(&target)? {
            Some(env) => {
                debug!(path = %path.display(), source = %target.display(), "Injected env");
                Ok(env)
            }
            None => {
                warn!(
                    path = %path.display(),
                    source = %target.display(),
                    "Env injection source not found, using empty env"
                );
                Ok(Value::Object(Map::new()))
            }
        }
    }

    /// Load every `extends` entry in order; later entries override earlier ones.
    fn load_extends(&mut self, path: &Path, dir: &Path, extends: &Value) -> PinfResult<Value> {
        let ids: Vec<&str> = match extends {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| {
                    let id = item.as_str();
                    if id.is_none() {
                        warn!(path = %path.display(), entry = %item, "Ignoring non-string `extends` entry");
                    }
                    id
                })
                .collect(),
            Value::String(id) => vec![id.as_str()],
            other => {
                return Err(PinfError::policy(
                    path,
                    format!("`extends` must be a list of descriptor ids, got {other}"),
                ));
            }
        };

        let mut inherited = Value::Object(Map::new());
        for id in ids {
            let id = id.replace(DIRNAME_TOKEN, &dir.to_string_lossy());
            let id = id.as_str();
            let target = self.resolve_extends(path, dir, id)?;
            debug!(path = %path.display(), id, target = %target.display(), "Extending descriptor");
            let parent = self
                .load(&target)?
                .ok_or_else(|| PinfError::ExtendsNotFound {
                    id: id.to_string(),
                    descriptor: path.to_path_buf(),
                })?;
            inherited = deep_merge(inherited, parent);
        }
        Ok(inherited)
    }

    /// Find the descriptor an `extends` id points at.
    ///
    /// Relative ids try `<packages_dir>/<id>/<stem>.prototype.json` in the nearest
    /// ancestor first, then `<id>` relative to the declaring descriptor. Absolute
    /// ids are only honoured from private (dot-prefixed) descriptors.
    pub fn resolve_extends(&self, path: &Path, dir: &Path, id: &str) -> PinfResult<PathBuf> {
        let not_found = || PinfError::ExtendsNotFound {
            id: id.to_string(),
            descriptor: path.to_path_buf(),
        };
        let candidate = Path::new(id);

        if candidate.is_absolute() {
            if !is_private(path) {
                return Err(PinfError::policy(
                    path,
                    format!(
                        "Absolute `extends` path '{id}' is only allowed in private (dot-prefixed) descriptors"
                    ),
                ));
            }
            return descriptor_at(candidate, path).ok_or_else(not_found);
        }

        let prototype = Path::new(&self.options.packages_dir)
            .join(id)
            .join(prototype_name(path));
        if let Some(found) = locate(dir, &prototype) {
            return Ok(found);
        }

        descriptor_at(&dir.join(candidate), path).ok_or_else(not_found)
    }
}

/// Parse descriptor text, which must hold a JSON object.
fn parse_descriptor(path: &Path, text: &str) -> PinfResult<Value> {
    let value: Value = serde_json::from_str(text).map_err(|err| PinfError::parse(path, text, &err))?;
    if !value.is_object() {
        return Err(PinfError::Parse {
            path: path.to_path_buf(),
            line: 1,
            column: 1,
            message: "descriptor must be a JSON object".to_string(),
        });
    }
    Ok(value)
}

/// The relative path of an `["<-", path]` directive, if `env` is one.
fn injection_target(env: Option<&Value>) -> Option<&str> {
    match env? {
        Value::Array(items) if items.len() == 2 && items[0] == INJECT_MARKER => items[1].as_str(),
        _ => None,
    }
}

/// Private descriptors have a dot-prefixed filename (`.package.json`).
pub fn is_private(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Basename with any leading dot removed: `.package.json` -> `package.json`.
fn public_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package.json".to_string());
    name.trim_start_matches('.').to_string()
}

/// `package.json` -> `package.prototype.json`.
fn prototype_name(path: &Path) -> String {
    let name = public_name(path);
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    format!("{stem}.prototype.json")
}

/// `candidate` itself when it is a file, or the same-named descriptor inside it.
fn descriptor_at(candidate: &Path, declaring: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    if candidate.is_dir() {
        let inner = candidate.join(public_name(declaring));
        if inner.is_file() {
            return Some(inner);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn loader(entries: &[(&str, &str)]) -> DescriptorLoader {
        DescriptorLoader::new(LoaderOptions::default(), entries.iter().copied().collect())
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp = TempDir::new().unwrap();
        let mut loader = loader(&[]);
        assert!(loader.load(&temp.path().join("package.json")).unwrap().is_none());
    }

    #[test]
    fn test_dirname_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, r#"{"directories": {"data": "$__DIRNAME/data"}}"#);

        let doc = loader(&[]).load(&path).unwrap().unwrap();
        let expected = format!("{}/data", temp.path().display());
        assert_eq!(doc["directories"]["data"], expected.as_str());
    }

    #[test]
    fn test_extends_child_wins() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, r#"{"b": 1, "extends": ["base"]}"#);
        write(
            &temp.path().join("node_modules/base/package.prototype.json"),
            r#"{"b": 2, "c": 3}"#,
        );

        let doc = loader(&[]).load(&path).unwrap().unwrap();
        assert_eq!(doc["b"], 1);
        assert_eq!(doc["c"], 3);
    }

    #[test]
    fn test_extends_falls_back_to_relative_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app").join("package.json");
        write(&path, r#"{"extends": ["../shared/base.json"], "own": true}"#);
        write(&temp.path().join("shared/base.json"), r#"{"inherited": true}"#);

        let doc = loader(&[]).load(&path).unwrap().unwrap();
        assert_eq!(doc["inherited"], true);
        assert_eq!(doc["own"], true);
    }

    #[test]
    fn test_extends_directory_uses_same_basename() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app").join("program.json");
        write(&path, r#"{"extends": ["../template"]}"#);
        write(&temp.path().join("template/program.json"), r#"{"from": "template"}"#);

        let doc = loader(&[]).load(&path).unwrap().unwrap();
        assert_eq!(doc["from"], "template");
    }

    #[test]
    fn test_extends_later_entries_override_earlier() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, r#"{"extends": ["one", "two"]}"#);
        write(&temp.path().join("node_modules/one/package.prototype.json"), r#"{"v": 1, "a": 1}"#);
        write(&temp.path().join("node_modules/two/package.prototype.json"), r#"{"v": 2}"#);

        let doc = loader(&[]).load(&path).unwrap().unwrap();
        assert_eq!(doc["v"], 2);
        assert_eq!(doc["a"], 1);
    }

    #[test]
    fn test_absolute_extends_rejected_for_public_descriptor() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base.json");
        write(&base, r#"{"a": 1}"#);
        let path = temp.path().join("package.json");
        write(&path, &format!(r#"{{"extends": ["{}"]}}"#, base.display()));

        let err = loader(&[]).load(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyViolation);
    }

    #[test]
    fn test_absolute_extends_allowed_for_private_descriptor() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base.json");
        write(&base, r#"{"a": 1}"#);
        let path = temp.path().join(".package.json");
        write(&path, &format!(r#"{{"extends": ["{}"]}}"#, base.display()));

        let doc = loader(&[]).load(&path).unwrap().unwrap();
        assert_eq!(doc["a"], 1);
    }

    #[test]
    fn test_unresolvable_extends_is_not_found() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, r#"{"extends": ["nowhere"]}"#);

        let err = loader(&[]).load(&path).unwrap_err();
        assert!(matches!(err, PinfError::ExtendsNotFound { ref id, .. } if id == "nowhere"));
    }

    #[test]
    fn test_extends_cycle_is_reported() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("a.json"), r#"{"extends": ["b.json"]}"#);
        write(&temp.path().join("b.json"), r#"{"extends": ["a.json"]}"#);

        let err = loader(&[]).load(&temp.path().join("a.json")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyViolation);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_env_injection_replaces_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("program.json");
        write(&path, r#"{"env": ["<-", "env/vars.json"], "config": {"home": "$APP_HOME"}}"#);
        write(&temp.path().join("env/vars.json"), r#"{"APP_HOME": "/srv/app"}"#);

        let mut loader = loader(&[]);
        let doc = loader.load(&path).unwrap().unwrap();
        assert_eq!(doc["env"], json!({"APP_HOME": "/srv/app"}));
        assert_eq!(doc["config"]["home"], "/srv/app");
        assert_eq!(loader.env().get("APP_HOME"), Some("/srv/app"));
    }

    #[test]
    fn test_missing_injection_source_yields_empty_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("program.json");
        write(&path, r#"{"env": ["<-", "missing.json"]}"#);

        let doc = loader(&[]).load(&path).unwrap().unwrap();
        assert_eq!(doc["env"], json!({}));
    }

    #[test]
    fn test_declared_env_feeds_substitution() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, r#"{"env": {"APP_PORT": "8080"}, "config": {"port": "$APP_PORT"}}"#);

        let mut loader = loader(&[]);
        let doc = loader.load(&path).unwrap().unwrap();
        assert_eq!(doc["config"]["port"], "8080");

        let later = temp.path().join("program.json");
        write(&later, r#"{"config": {"url": "http://localhost:$APP_PORT"}}"#);
        let doc = loader.load(&later).unwrap().unwrap();
        assert_eq!(doc["config"]["url"], "http://localhost:8080");
    }

    #[test]
    fn test_bare_token_outside_string() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("program.json");
        write(&path, r#"{"config": {"port": $APP_PORT}}"#);

        let doc = loader(&[("APP_PORT", "8080")]).load(&path).unwrap().unwrap();
        assert_eq!(doc["config"]["port"], 8080);
    }

    #[test]
    fn test_bare_unset_token_is_missing_env_var() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("program.json");
        write(&path, r#"{"config": {"port": $UNDEFINED_PORT}}"#);

        let err = loader(&[]).load(&path).unwrap_err();
        assert!(matches!(err, PinfError::MissingEnvVar { ref name, .. } if name == "UNDEFINED_PORT"));
    }

    #[test]
    fn test_dirname_with_dollar_segment_not_treated_as_var() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("$HOME_X");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("package.json");
        write(&path, r#"{"d": "$__DIRNAME", "env": {"DATA": "$__DIRNAME/data"}}"#);

        let mut descriptors = loader(&[]);
        let doc = descriptors.load(&path).unwrap().unwrap();
        let dir = std::path::absolute(&dir).unwrap().display().to_string();
        assert_eq!(doc["d"], dir);
        assert_eq!(descriptors.env().get("DATA"), Some(format!("{dir}/data").as_str()));
    }

    #[test]
    fn test_strict_missing_var() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, r#"{"config": {"a": "$UNDEFINED_VAR"}}"#);

        let err = loader(&[]).load(&path).unwrap_err();
        assert!(matches!(err, PinfError::MissingEnvVar { ref name, .. } if name == "UNDEFINED_VAR"));
    }

    #[test]
    fn test_non_strict_keeps_token() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, r#"{"config": {"a": "$UNDEFINED_VAR"}}"#);

        let mut loader = DescriptorLoader::new(LoaderOptions::default().non_strict(), EnvSnapshot::new());
        let doc = loader.load(&path).unwrap().unwrap();
        assert_eq!(doc["config"]["a"], "$UNDEFINED_VAR");
    }

    #[test]
    fn test_parse_error_carries_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, "{\n  \"a\": 1,\n  \"b\" 2\n}");

        let err = loader(&[]).load(&path).unwrap_err();
        match &err {
            PinfError::Parse { path: p, line, .. } => {
                assert_eq!(p, &path);
                assert_eq!(*line, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_object_descriptor_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("package.json");
        write(&path, "[1, 2]");

        let err = loader(&[]).load(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParseError);
    }

    #[test]
    fn test_prototype_name() {
        assert_eq!(prototype_name(Path::new("/a/package.json")), "package.prototype.json");
        assert_eq!(prototype_name(Path::new("/a/.program.json")), "program.prototype.json");
    }
}
