//! Data produced by compiler backends for a single module.

use tern_types::FunctionIndex;

/// Offset in bytes from the beginning of a compiled function.
pub type CodeOffset = u32;

/// The bytes of a compiled function body, ready to be linked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionBody {
    /// The generated machine code for this function.
    pub body: Vec<u8>,
}

/// A direct call site that still needs to be patched to its callee once
/// every function has an address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnlinkedWasmToWasmCall {
    /// Where the call instruction lives inside the function body.
    pub call_location: CodeOffset,
    /// The function the call targets, in the combined import+local index
    /// space.
    pub target: FunctionIndex,
}

/// Everything a backend hands back for one compiled function.
#[derive(Clone, Debug, Default)]
pub struct CompiledFunction {
    /// The generated code.
    pub body: FunctionBody,
    /// Call sites awaiting linkage.
    pub unlinked_wasm_to_wasm_calls: Vec<UnlinkedWasmToWasmCall>,
}

/// A generated entry thunk letting compiled module code call across a
/// module or host boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trampoline {
    /// A thunk generated by the backend.
    Compiled(FunctionBody),
    /// The interpreter's shared wasm-to-wasm entry point, used when no
    /// backend-generated thunk is available.
    InterpreterWasmToWasm,
    /// The interpreter's shared wasm-to-host entry point.
    InterpreterWasmToHost,
}
