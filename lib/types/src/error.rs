//! The WebAssembly possible errors
use thiserror::Error;

/// A WebAssembly translation error.
///
/// Produced while decoding or validating a module binary, before any code
/// generation has started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WasmError {
    /// The input WebAssembly code is invalid.
    ///
    /// This error code is used by a WebAssembly translator when it
    /// encounters invalid WebAssembly code. This should never happen for
    /// validated WebAssembly code.
    #[error("Invalid input WebAssembly code at offset {offset}: {message}")]
    InvalidWebAssembly {
        /// A string describing the validation error.
        message: String,
        /// The bytecode offset where the error occurred.
        offset: usize,
    },

    /// A feature used by the WebAssembly code is not supported by the
    /// embedding environment.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// An implementation limit was exceeded.
    #[error("Implementation limit exceeded")]
    ImplLimitExceeded,

    /// A generic error.
    #[error("{0}")]
    Generic(String),
}

/// A convenient alias for a `Result` that uses `WasmError` as the error type.
pub type WasmResult<T> = Result<T, WasmError>;
