//! Module environment: collects declarations while a module is translated.

use tern_types::{
    ElementSegment, Export, FunctionData, FunctionIndex, FunctionType, Import, ImportType,
    LocalFunctionIndex, ModuleInfo, SignatureIndex, WasmError, WasmResult,
};

/// The object a translation fills in: declarations arrive section by
/// section through the `declare_*` methods, and `finish` yields the
/// completed [`ModuleInfo`].
#[derive(Default)]
pub struct ModuleEnvironment {
    module: ModuleInfo,
    /// Index of the next function body the code section will define.
    code_index: u32,
}

impl ModuleEnvironment {
    /// Creates a new environment ready to start translating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the environment, yielding the translated module.
    pub fn finish(self) -> ModuleInfo {
        self.module
    }

    /// Checks that a section's entry count is representable.
    pub fn reserve_entries(&mut self, count: u32) -> WasmResult<()> {
        // We reserve `u32::MAX` for our own use.
        if count == u32::MAX {
            return Err(WasmError::ImplLimitExceeded);
        }
        Ok(())
    }

    /// Declares a signature from the type section.
    pub fn declare_signature(&mut self, signature: FunctionType) -> WasmResult<()> {
        self.module.signatures.push(signature);
        Ok(())
    }

    /// Declares a function import with the given signature.
    pub fn declare_func_import(
        &mut self,
        sig_index: SignatureIndex,
        module: &str,
        field: &str,
    ) -> WasmResult<()> {
        if self.module.functions.len() != 0 {
            return Err(WasmError::Generic(
                "imports must be declared before local functions".to_string(),
            ));
        }
        self.module.imports.push(Import {
            module: module.to_string(),
            field: field.to_string(),
            ty: ImportType::Function(sig_index),
        });
        self.module.import_function_type_indices.push(sig_index);
        Ok(())
    }

    /// Declares a non-function import.
    pub fn declare_other_import(
        &mut self,
        ty: ImportType,
        module: &str,
        field: &str,
    ) -> WasmResult<()> {
        self.module.imports.push(Import {
            module: module.to_string(),
            field: field.to_string(),
            ty,
        });
        Ok(())
    }

    /// Declares a local function with the given signature; its body arrives
    /// later, from the code section.
    pub fn declare_func_type(&mut self, sig_index: SignatureIndex) -> WasmResult<()> {
        self.module.functions.push(FunctionData {
            signature: sig_index,
            data: Vec::new(),
        });
        Ok(())
    }

    /// Declares an export.
    pub fn declare_export(&mut self, export: Export) -> WasmResult<()> {
        self.module.exports.push(export);
        Ok(())
    }

    /// Declares the start function.
    pub fn declare_start_function(&mut self, func: FunctionIndex) -> WasmResult<()> {
        self.module.start_function = Some(func);
        Ok(())
    }

    /// Declares an element segment.
    pub fn declare_element_segment(&mut self, segment: ElementSegment) -> WasmResult<()> {
        self.module.elements.push(segment);
        Ok(())
    }

    /// Defines the body of the next declared function.
    pub fn define_function_body(&mut self, body: &[u8]) -> WasmResult<()> {
        let index = LocalFunctionIndex::from_u32(self.code_index);
        let function = self.module.functions.get_mut(index).ok_or_else(|| {
            WasmError::Generic("code section defines more bodies than declared".to_string())
        })?;
        function.data = body.to_vec();
        self.module.total_function_size += body.len();
        self.code_index += 1;
        Ok(())
    }
}
