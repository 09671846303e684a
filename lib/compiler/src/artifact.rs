//! Define `Artifact`: the payload a completed plan hands to its
//! completion observers, ready for linking and instantiation.

use crate::function::{FunctionBody, Trampoline, UnlinkedWasmToWasmCall};
use std::collections::HashSet;
use std::sync::Arc;
use tern_types::entity::PrimaryMap;
use tern_types::{LocalFunctionIndex, ModuleInfo};

/// A compiled module.
///
/// Nothing here is observable before the plan reaches `Completed`, so an
/// artifact is always whole: one body per local function, one wasm-to-wasm
/// trampoline per Function-kind import and one wasm-to-host trampoline per
/// import-function slot.
#[derive(Debug)]
pub struct Artifact {
    module: Arc<ModuleInfo>,
    functions: PrimaryMap<LocalFunctionIndex, FunctionBody>,
    wasm_to_wasm_trampolines: Vec<Trampoline>,
    wasm_to_host_trampolines: Vec<Trampoline>,
    unlinked_wasm_to_wasm_calls: Vec<Vec<UnlinkedWasmToWasmCall>>,
    exported_function_indices: HashSet<LocalFunctionIndex>,
}

impl Artifact {
    pub(crate) fn new(
        module: Arc<ModuleInfo>,
        functions: PrimaryMap<LocalFunctionIndex, FunctionBody>,
        wasm_to_wasm_trampolines: Vec<Trampoline>,
        wasm_to_host_trampolines: Vec<Trampoline>,
        unlinked_wasm_to_wasm_calls: Vec<Vec<UnlinkedWasmToWasmCall>>,
        exported_function_indices: HashSet<LocalFunctionIndex>,
    ) -> Self {
        Self {
            module,
            functions,
            wasm_to_wasm_trampolines,
            wasm_to_host_trampolines,
            unlinked_wasm_to_wasm_calls,
            exported_function_indices,
        }
    }

    /// The module this artifact was compiled from.
    pub fn module_info(&self) -> &Arc<ModuleInfo> {
        &self.module
    }

    /// Get Function Bodies ref
    pub fn get_function_bodies_ref(&self) -> &PrimaryMap<LocalFunctionIndex, FunctionBody> {
        &self.functions
    }

    /// Get Wasm-to-Wasm Trampolines ref, one per Function-kind import.
    pub fn get_wasm_to_wasm_trampolines_ref(&self) -> &[Trampoline] {
        &self.wasm_to_wasm_trampolines
    }

    /// Get Wasm-to-Host Trampolines ref, one per import-function slot.
    pub fn get_wasm_to_host_trampolines_ref(&self) -> &[Trampoline] {
        &self.wasm_to_host_trampolines
    }

    /// Get the call sites awaiting linkage, one list per local function.
    pub fn get_unlinked_wasm_to_wasm_calls_ref(&self) -> &[Vec<UnlinkedWasmToWasmCall>] {
        &self.unlinked_wasm_to_wasm_calls
    }

    /// The local functions that must stay independently invokable because
    /// they are observable from outside the module: exported, referenced
    /// by a `ref.func` element initializer, or the start function.
    pub fn exported_function_indices(&self) -> &HashSet<LocalFunctionIndex> {
        &self.exported_function_indices
    }
}
