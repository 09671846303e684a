use tern_types::WasmError;
use thiserror::Error;

// Compilation Errors

/// The errors a module compilation can surface.
///
/// Every failure a [`Plan`](crate::Plan) records, whatever thread detects
/// it, funnels into one of these variants before completion tasks see it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A wasm translation error occured.
    #[error("WebAssembly translation error: {0}")]
    Wasm(#[from] WasmError),

    /// A compilation error occured.
    #[error("Compilation error: {0}")]
    Codegen(String),

    /// The module did not pass validation.
    #[error("Validation error: {0}")]
    Validate(String),

    /// Insufficient resources available for execution.
    #[error("Insufficient resources: {0}")]
    Resource(String),
}
