//! The `tern-types` crate holds the data structures shared between the
//! Tern translator, the compilation plan and the compiler backends.
//!
//! Everything here is produced once while a module is parsed and then read
//! concurrently by however many compiler threads the embedder runs, so the
//! types are immutable apart from two atomic feature-usage flags on
//! [`ModuleInfo`].

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

mod error;
mod features;
mod indexes;
mod module;

pub use crate::error::{WasmError, WasmResult};
pub use crate::features::Features;
pub use crate::indexes::{FunctionIndex, LocalFunctionIndex, SignatureIndex};
pub use crate::module::{
    ElementInit, ElementSegment, Export, ExportIndex, FunctionData, FunctionType, Import,
    ImportType, ModuleInfo, Type,
};

/// The entity structures backing the module index spaces.
pub use cranelift_entity as entity;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
