use tern_types::WasmError;
use wasmparser::BinaryReaderError;

/// Converts a Wasm binary reading error to a translation error.
pub(crate) fn from_binary_reader_error(original: BinaryReaderError) -> WasmError {
    WasmError::InvalidWebAssembly {
        message: original.message().into(),
        offset: original.offset(),
    }
}
