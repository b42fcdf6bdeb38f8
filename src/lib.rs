//! PINF configuration resolution.
//!
//! Computes the effective configuration of a module within a program by
//! merging the package, program, private, runtime-state and mode descriptors,
//! then extracting the namespace-scoped `config` and `env` and the module's
//! well-known directories.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod pinf;
pub mod registry;

pub use error::{ErrorCode, PinfError, PinfResult};
pub use paths::{PathKind, PathSet};
pub use pinf::{
    EffectiveConfig, ModuleRef, ModuleResolver, ModuleSeed, PACKAGE_DESCRIPTOR, Pinf,
    path_in_config, run,
};
pub use registry::{Instance, InstanceFactory, InstanceKey, InstanceRegistry};
