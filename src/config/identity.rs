//! Module identity: uid, instance id and the namespaces derived from them.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// Instance id used when none is declared.
pub const DEFAULT_INSTANCE_ID: &str = "singleton";

/// Namespace key addressing the package itself.
pub const SELF_NAMESPACE: &str = ".";

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("static scheme pattern"));

static SLASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/+").expect("static slash pattern"));

/// Normalize a uid by stripping the URI scheme and keeping host + path.
///
/// Userinfo, port, query and fragment are dropped. Strings without a scheme
/// keep everything before the first `?` or `#`. Returns `None` for blank input.
///
/// ```
/// use pinf_config::config::format_uid;
///
/// assert_eq!(format_uid("https://github.com/pinf/app?x=1").as_deref(), Some("github.com/pinf/app"));
/// assert_eq!(format_uid("github.com/pinf/app").as_deref(), Some("github.com/pinf/app"));
/// ```
pub fn format_uid(uri: &str) -> Option<String> {
    let uri = uri.trim();
    if uri.is_empty() {
        return None;
    }
    match SCHEME.find(uri) {
        Some(scheme) => {
            let (host, path) = split_authority(&uri[scheme.end()..]);
            let path = if path.is_empty() { "/" } else { path };
            Some(format!("{host}{path}"))
        }
        None => Some(strip_query(uri).to_string()),
    }
}

/// Drop a leading `scheme://`, if any.
pub(crate) fn strip_scheme(uri: &str) -> &str {
    match SCHEME.find(uri) {
        Some(scheme) => &uri[scheme.end()..],
        None => uri,
    }
}

/// Split `host[:port]/path?query` into lowercase host and path.
pub(crate) fn split_authority(rest: &str) -> (String, &str) {
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    (host.to_ascii_lowercase(), strip_query(tail))
}

fn strip_query(value: &str) -> &str {
    let end = value.find(['?', '#']).unwrap_or(value.len());
    &value[..end]
}

/// Map a uri onto a relative path: `:@#` become `/`, `?&=` become `+`,
/// slash runs collapse and a trailing slash becomes `+`.
pub fn uri_to_path(uri: &str) -> String {
    let mapped: String = uri
        .chars()
        .map(|c| match c {
            ':' | '@' | '#' => '/',
            '?' | '&' | '=' => '+',
            c => c,
        })
        .collect();
    let mut collapsed = SLASH_RUN.replace_all(&mapped, "/").into_owned();
    if collapsed.ends_with('/') {
        collapsed.pop();
        collapsed.push('+');
    }
    collapsed
}

/// Like [`uri_to_path`], flattened into a single path component.
pub fn uri_to_filename(uri: &str) -> String {
    uri_to_path(uri).replace('/', "+")
}

/// Namespace keys a module reads its config and env under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespaces {
    /// Filesystem-safe form of `uid:iid`, used for default directories.
    pub filename: String,
    pub config: String,
    pub env: String,
    pub api: String,
}

/// Namespace overrides supplied before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSeed {
    pub filename: Option<String>,
    pub config: Option<String>,
    pub env: Option<String>,
    pub api: Option<String>,
}

/// Resolved identity of a module within a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub uid: String,
    pub iid: String,
    pub ns: Namespaces,
}

impl ModuleIdentity {
    /// Derive the identity, each field falling back in order.
    ///
    /// - `uid`: `uid`, then `package_uid`, then the package descriptor directory
    /// - `iid`: `iid`, then [`DEFAULT_INSTANCE_ID`]
    /// - `ns.config` / `ns.api`: seed, then `package_uid`, then `.`
    /// - `ns.env`: seed, then `ns.config`
    pub fn derive(
        uid: Option<&str>,
        iid: Option<&str>,
        ns: &NamespaceSeed,
        package_uid: Option<&str>,
        package_dir: &Path,
    ) -> Self {
        let uid = uid
            .and_then(format_uid)
            .or_else(|| package_uid.map(str::to_string))
            .or_else(|| format_uid(&package_dir.to_string_lossy()))
            .unwrap_or_else(|| SELF_NAMESPACE.to_string());
        let iid = iid.unwrap_or(DEFAULT_INSTANCE_ID).to_string();

        let filename = ns
            .filename
            .clone()
            .unwrap_or_else(|| uri_to_filename(&format!("{uid}:{iid}")));
        let package_ns = || package_uid.unwrap_or(SELF_NAMESPACE).to_string();
        let config = ns.config.clone().unwrap_or_else(package_ns);
        let env = ns.env.clone().unwrap_or_else(|| config.clone());
        let api = ns.api.clone().unwrap_or_else(package_ns);

        Self {
            uid,
            iid,
            ns: Namespaces {
                filename,
                config,
                env,
                api,
            },
        }
    }

    /// Instance id within the program: `uid:iid`.
    pub fn instance_id(&self) -> String {
        format!("{}:{}", self.uid, self.iid)
    }
}
