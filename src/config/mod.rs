//! Descriptor resolution.
//!
//! Builds the effective descriptor of a package from up to six JSON
//! descriptors, lowest to highest precedence:
//! 1. **Package** - `package.json` (what to boot)
//! 2. **Program** - `program.json` (how to boot)
//! 3. **Private package** - `.package.json`
//! 4. **Private program** - `.program.json`
//! 5. **Runtime** - `.rt/program.rt.json` (the state to boot in)
//! 6. **Mode** - `program.<mode>.json`
//!
//! ## Merge Strategy
//! - Objects merge key by key, recursively
//! - Everything else (arrays, scalars, `null`) is replaced by the later source
//!
//! ## Environment Variables
//! - `PINF_PROGRAM` - Program descriptor (default: `./program.json`)
//! - `PINF_PACKAGE` - Package descriptor (default: `./package.json`)
//! - `PINF_MODE` - Mode descriptor selector (default: `production`)
//! - `PINF_RUNTIME` - Set in the substitution snapshot to the runtime descriptor
//! - `PINF_STRICT` - Fail on unset `$NAME` tokens (default: on)
//! - `PINF_PACKAGES_DIR` - Directory searched for `extends` prototypes (default: `node_modules`)

mod env;
mod identity;
mod loader;
mod locator;
mod merge;
mod namespace;
mod pipeline;
mod types;

pub use env::{DIRNAME_TOKEN, EnvSnapshot, UnsetVariable, referenced_vars};
pub use identity::{
    DEFAULT_INSTANCE_ID, ModuleIdentity, NamespaceSeed, Namespaces, SELF_NAMESPACE, format_uid,
    uri_to_filename, uri_to_path,
};
pub use loader::{DescriptorLoader, INJECT_MARKER, is_private};
pub use locator::locate;
pub use merge::{deep_merge, deep_merge_all};
pub use namespace::{
    MAPPING_PROPERTIES, NamespacedValues, VERSION_SUFFIX, extract_namespace,
    resolve_mapped_namespace,
};
pub use pipeline::{
    DescriptorSource, MergePipeline, MergedDescriptor, SourcePaths, private_variant,
    wrap_namespace,
};
pub use types::*;
