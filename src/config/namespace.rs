//! Namespace-scoped extraction of `config` and `env` from an effective descriptor.
//!
//! Layers, lowest to highest precedence:
//! 1. `.` (the package's own defaults)
//! 2. the module uid
//! 3. the requested namespace (or `ns.config` / `ns.env` when none is requested),
//!    plus the `"0"` suffixed variant for config

use super::identity::{ModuleIdentity, SELF_NAMESPACE, split_authority, strip_scheme};
use super::merge::deep_merge;
use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::{debug, warn};

/// Descriptor properties that may map a short name onto a uri.
pub const MAPPING_PROPERTIES: [&str; 3] = ["mappings", "optionalMappings", "devMappings"];

/// Suffix of the version-scoped config rule. Matched literally.
pub const VERSION_SUFFIX: &str = "0";

/// Config and env trees that apply to one namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespacedValues {
    pub config: Value,
    pub env: Value,
}

impl Default for NamespacedValues {
    fn default() -> Self {
        Self {
            config: Value::Object(Map::new()),
            env: Value::Object(Map::new()),
        }
    }
}

/// Extract the config and env that apply to `identity`, optionally narrowed
/// to `requested`.
pub fn extract_namespace(
    descriptor: &Value,
    identity: &ModuleIdentity,
    requested: Option<&str>,
) -> NamespacedValues {
    let mut values = NamespacedValues::default();

    merge_property(&mut values.config, descriptor, "config", SELF_NAMESPACE);
    merge_property(&mut values.env, descriptor, "env", SELF_NAMESPACE);

    merge_property(&mut values.config, descriptor, "config", &identity.uid);
    merge_property(&mut values.env, descriptor, "env", &identity.uid);

    match requested {
        Some(ns) => {
            let ns = resolve_mapped_namespace(descriptor, ns);
            merge_property(&mut values.config, descriptor, "config", &ns);
            merge_property(&mut values.config, descriptor, "config", &format!("{ns}{VERSION_SUFFIX}"));
            merge_property(&mut values.env, descriptor, "env", &ns);
        }
        None => {
            let config_ns = &identity.ns.config;
            merge_property(&mut values.config, descriptor, "config", config_ns);
            merge_property(
                &mut values.config,
                descriptor,
                "config",
                &format!("{config_ns}{VERSION_SUFFIX}"),
            );
            merge_property(&mut values.env, descriptor, "env", &identity.ns.env);
        }
    }

    values
}

/// Merge `descriptor[property][ns]` into `target` when it is an object.
fn merge_property(target: &mut Value, descriptor: &Value, property: &str, ns: &str) {
    let Some(section) = descriptor.get(property).and_then(|p| p.get(ns)) else {
        return;
    };
    match section {
        Value::Object(_) => {
            *target = deep_merge(target.take(), section.clone());
        }
        Value::Null => {}
        other => {
            warn!(property, ns, value = %other, "Ignoring non-object namespace section");
        }
    }
}

/// Rewrite a short namespace through the descriptor's mappings.
///
/// Namespaces containing `/` are returned unchanged. Otherwise the first
/// mapping property whose entry for `ns` is a `host/path/target` string turns
/// it into `host/path/`.
pub fn resolve_mapped_namespace<'a>(descriptor: &Value, ns: &'a str) -> Cow<'a, str> {
    if ns.contains('/') {
        return Cow::Borrowed(ns);
    }
    for property in MAPPING_PROPERTIES {
        let Some(target) = descriptor
            .get(property)
            .and_then(|mappings| mappings.get(ns))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if let Some(rewritten) = mapping_namespace(target) {
            debug!(ns, property, target, namespace = %rewritten, "Namespace rewritten through mapping");
            return Cow::Owned(rewritten);
        }
    }
    Cow::Borrowed(ns)
}

/// `github.com/pinf/lib/package` -> `github.com/pinf/lib/`.
///
/// Targets without a host or whose path already ends in `/` yield `None`.
fn mapping_namespace(target: &str) -> Option<String> {
    let (host, path) = split_authority(strip_scheme(target));
    if host.is_empty() || host.chars().all(|c| c == '.') {
        return None;
    }
    let path = if path.is_empty() { "/" } else { path };
    if path.ends_with('/') {
        return None;
    }
    let parent = match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    };
    Some(format!("{host}{}/", parent.trim_end_matches('/')))
}
