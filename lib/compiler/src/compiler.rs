//! This module mainly outputs the `Compiler` trait that custom
//! compilers will need to implement.

use crate::error::CompileError;
use crate::function::{CompiledFunction, Trampoline};
use tern_types::{LocalFunctionIndex, ModuleInfo, SignatureIndex};

/// An implementation of a compiler from validated WebAssembly functions to
/// native code.
///
/// A single `Compiler` is shared by every worker thread of a plan, so
/// implementations must be callable concurrently. The hooks other than
/// [`compile_function`](Compiler::compile_function) may run while the plan
/// holds its internal lock; implementations must not call back into the
/// plan from them.
pub trait Compiler: Send + Sync {
    /// Called once after the module is validated, before any function is
    /// compiled. Backends size their own per-module tables here.
    fn prepare(&self, module: &ModuleInfo) -> Result<(), CompileError> {
        let _ = module;
        Ok(())
    }

    /// Compiles a single function body.
    ///
    /// Backends observing `try`/`try_table` while decoding the body record
    /// it through the module's exception usage flags; the plan checks the
    /// flags after every batch and rejects modules mixing the two models.
    fn compile_function(
        &self,
        module: &ModuleInfo,
        index: LocalFunctionIndex,
        data: &[u8],
    ) -> CompiledFunction;

    /// Generates the thunk a compiled function uses to call the imported
    /// function at `import_function_index` in another module.
    ///
    /// Fails when no executable memory can be allocated for the thunk.
    fn wasm_to_wasm_trampoline(
        &self,
        module: &ModuleInfo,
        import_function_index: u32,
    ) -> Result<Trampoline, CompileError>;

    /// Generates the thunk marshalling a call from compiled code into the
    /// embedder's native function at `import_function_index`, whose
    /// signature is `type_index`.
    fn wasm_to_host_trampoline(
        &self,
        module: &ModuleInfo,
        type_index: SignatureIndex,
        import_function_index: u32,
    ) -> Result<Trampoline, CompileError>;

    /// Called once when every function of a successfully compiled module
    /// has been generated, before completion tasks run.
    fn did_complete_compilation(&self, module: &ModuleInfo) {
        let _ = module;
    }
}
