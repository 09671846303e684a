//! This module defines the parser and translator from `wasmparser`
//! to a shared `ModuleInfo`.
//!
//! Translation is single-pass and streaming: bytes go in through
//! [`StreamingParser::add_bytes`] in whatever chunk sizes the caller has,
//! each section payload is validated and handed to a
//! [`ModuleEnvironment`], and [`StreamingParser::finalize`] yields the
//! finished module.
mod environ;
mod error;
mod sections;
mod streaming;

pub use self::environ::ModuleEnvironment;
pub use self::streaming::{translate_module, StreamingParser};
