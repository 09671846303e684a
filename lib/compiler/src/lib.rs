//! The `tern-compiler` crate drives a validated WebAssembly module through
//! code generation.
//!
//! It parses and validates a module via `wasmparser`, while giving the
//! responsibility of compiling specific function bodies to a [`Compiler`]
//! implementation. The centerpiece is the [`Plan`]: a concurrent
//! compilation plan that any number of worker threads enter through
//! [`Plan::compile_functions`], claiming adaptively-sized batches of
//! functions until none remain and notifying completion observers exactly
//! once.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

mod artifact;
mod compiler;
mod config;
mod engine;
mod error;
mod function;
mod plan;
mod translator;

pub use crate::artifact::Artifact;
pub use crate::compiler::Compiler;
pub use crate::config::{CompileOptions, LARGE_MODULE_LOOP_FACTOR};
pub use crate::engine::Engine;
pub use crate::error::CompileError;
pub use crate::function::{
    CodeOffset, CompiledFunction, FunctionBody, Trampoline, UnlinkedWasmToWasmCall,
};
pub use crate::plan::{CompletionTask, Plan, State};
pub use crate::translator::{translate_module, ModuleEnvironment, StreamingParser};

pub use tern_types::Features;

/// wasmparser is exported as a module to slim compiler dependencies
pub use wasmparser;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
