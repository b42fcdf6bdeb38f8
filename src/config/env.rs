//! Environment snapshot used as the substitution source for descriptors.
//!
//! The snapshot starts as a copy of the process environment and grows as
//! descriptors declare `env` entries. The process environment itself is never
//! modified.

use regex_lite::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Token replaced with the directory holding the descriptor being loaded.
pub const DIRNAME_TOKEN: &str = "$__DIRNAME";

/// `$NAME` tokens looked up in the snapshot.
static VAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Z][A-Z0-9_]*").expect("static token pattern"));

/// A `$NAME` token that had no value in strict mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsetVariable(pub String);

/// Copy of the process environment plus descriptor-declared entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge the scalar entries of a descriptor's `env` object into the snapshot.
    ///
    /// String values are expanded against the snapshot first; values that still
    /// hold an unresolved `$NAME` placeholder are skipped. Nested objects (namespace
    /// maps) and arrays are ignored. `$__DIRNAME` is replaced with `dirname` after
    /// the placeholder check. Returns the number of entries absorbed.
    pub fn absorb_declared(&mut self, env: &Value, dirname: Option<&str>) -> usize {
        let Value::Object(entries) = env else {
            return 0;
        };

        let mut absorbed = Vec::new();
        for (name, value) in entries {
            let value = match value {
                Value::String(s) => self.expand(s, false),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            if contains_placeholder(&value) {
                continue;
            }
            let value = match dirname {
                Some(dir) => value.replace(DIRNAME_TOKEN, dir),
                None => value,
            };
            absorbed.push((name.clone(), value));
        }

        let count = absorbed.len();
        self.vars.extend(absorbed);
        count
    }

    /// Replace every `$NAME` token in descriptor text.
    ///
    /// Values are escaped for inclusion inside a JSON string. In strict mode the
    /// first token without a value fails the substitution; otherwise unknown tokens
    /// are left in place.
    pub fn substitute(&self, text: &str, strict: bool) -> Result<String, UnsetVariable> {
        if strict
            && let Some(name) = referenced_vars(text)
                .into_iter()
                .find(|name| !self.contains(name))
        {
            return Err(UnsetVariable(name));
        }
        Ok(self.expand(text, true))
    }

    fn expand(&self, text: &str, escape: bool) -> String {
        VAR_TOKEN
            .replace_all(text, |caps: &Captures<'_>| {
                let token = &caps[0];
                match self.get(&token[1..]) {
                    Some(value) if escape => escape_json_fragment(value),
                    Some(value) => value.to_string(),
                    None => token.to_string(),
                }
            })
            .into_owned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Names of all `$NAME` tokens in `text`, in order of appearance, deduplicated.
pub fn referenced_vars(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for m in VAR_TOKEN.find_iter(text) {
        let name = &m.as_str()[1..];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Whether `value` still carries a `$NAME` token.
pub fn contains_placeholder(value: &str) -> bool {
    VAR_TOKEN.is_match(value)
}

/// Escape `value` so it can be spliced between the quotes of a JSON string.
pub fn escape_json_fragment(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
