//! Data structures describing a parsed WebAssembly module.

use crate::indexes::{FunctionIndex, LocalFunctionIndex, SignatureIndex};
use cranelift_entity::PrimaryMap;
use std::sync::atomic::AtomicBool;

/// The value types a function signature can mention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// A 32-bit integer.
    I32,
    /// A 64-bit integer.
    I64,
    /// A 32-bit float.
    F32,
    /// A 64-bit float.
    F64,
    /// A 128-bit SIMD vector.
    V128,
    /// A reference to a function.
    FuncRef,
    /// A reference to an embedder value.
    ExternRef,
}

/// The signature of a WebAssembly function.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    /// The parameter types of the function.
    params: Box<[Type]>,
    /// The result types of the function.
    results: Box<[Type]>,
}

impl FunctionType {
    /// Creates a new function type from parameter and result types.
    pub fn new<P, R>(params: P, results: R) -> Self
    where
        P: Into<Box<[Type]>>,
        R: Into<Box<[Type]>>,
    {
        Self {
            params: params.into(),
            results: results.into(),
        }
    }

    /// Parameter types.
    pub fn params(&self) -> &[Type] {
        &self.params
    }

    /// Result types.
    pub fn results(&self) -> &[Type] {
        &self.results
    }
}

/// What kind of entity an import brings into the module.
///
/// Only function imports matter to the compilation pipeline; the other
/// kinds are carried so imports keep their module order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportType {
    /// A function import with the signature it was declared with.
    Function(SignatureIndex),
    /// A table import.
    Table,
    /// A linear memory import.
    Memory,
    /// A global import.
    Global,
    /// An exception tag import.
    Tag,
}

/// An import declared by the module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    /// The name of the module this import comes from.
    pub module: String,
    /// The name of the field inside that module.
    pub field: String,
    /// The kind of entity imported.
    pub ty: ImportType,
}

/// The entity referenced by an export, in the combined import+local index
/// space of its kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportIndex {
    /// An exported function.
    Function(FunctionIndex),
    /// An exported table.
    Table(u32),
    /// An exported linear memory.
    Memory(u32),
    /// An exported global.
    Global(u32),
    /// An exported exception tag.
    Tag(u32),
}

/// An export declared by the module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Export {
    /// The name the entity is exported under.
    pub name: String,
    /// The entity being exported.
    pub index: ExportIndex,
}

/// A single slot initializer inside an element segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementInit {
    /// The slot holds a reference to a function.
    RefFunc(FunctionIndex),
    /// The slot holds a null reference.
    RefNull,
    /// The slot is initialized by an expression that references no
    /// function directly (e.g. `global.get`).
    Other,
}

/// A table element segment, reduced to the initializers it contains.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementSegment {
    /// The slot initializers, in segment order.
    pub items: Vec<ElementInit>,
}

/// A local function: its signature and its raw body bytes, locals included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionData {
    /// The signature the function was declared with.
    pub signature: SignatureIndex,
    /// The body bytes, exactly as they appear in the code section.
    pub data: Vec<u8>,
}

/// A translated WebAssembly module.
///
/// Produced once by the translator, then shared read-only between the
/// compilation plan and all of its compiler threads. The two exception
/// usage flags are the only fields mutated after translation: backends set
/// them with relaxed stores as they decode function bodies.
#[derive(Debug, Default)]
pub struct ModuleInfo {
    /// The signatures declared in the type section.
    pub signatures: PrimaryMap<SignatureIndex, FunctionType>,
    /// The functions defined locally in the module.
    pub functions: PrimaryMap<LocalFunctionIndex, FunctionData>,
    /// Every import, in module order.
    pub imports: Vec<Import>,
    /// The signature of each function import, 1:1 with the sub-sequence of
    /// [`ImportType::Function`] entries in `imports`.
    pub import_function_type_indices: Vec<SignatureIndex>,
    /// Every export, in module order.
    pub exports: Vec<Export>,
    /// The element segments, reduced to their slot initializers.
    pub elements: Vec<ElementSegment>,
    /// The start function, if the module declares one.
    pub start_function: Option<FunctionIndex>,
    /// Cached sum of all function body sizes, maintained during
    /// translation.
    pub total_function_size: usize,
    /// Whether any decoded function body uses `try_table`-style exceptions.
    pub uses_exceptions: AtomicBool,
    /// Whether any decoded function body uses `try`/`catch`-style
    /// exceptions.
    pub uses_legacy_exceptions: AtomicBool,
}

impl ModuleInfo {
    /// The number of imported functions.
    pub fn import_function_count(&self) -> usize {
        self.import_function_type_indices.len()
    }

    /// Converts a local function index to the combined index space.
    pub fn func_index(&self, local: LocalFunctionIndex) -> FunctionIndex {
        FunctionIndex::from_u32(self.import_function_count() as u32 + local.as_u32())
    }

    /// Converts a combined-space function index to a local one, or `None`
    /// if it refers to an imported function.
    pub fn local_func_index(&self, func: FunctionIndex) -> Option<LocalFunctionIndex> {
        func.as_u32()
            .checked_sub(self.import_function_count() as u32)
            .map(LocalFunctionIndex::from_u32)
    }

    /// Whether the given function index refers to an imported function.
    pub fn is_imported_function(&self, func: FunctionIndex) -> bool {
        (func.as_u32() as usize) < self.import_function_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_two_imports() -> ModuleInfo {
        let mut module = ModuleInfo::default();
        let sig = module.signatures.push(FunctionType::new(vec![], vec![]));
        for field in ["a", "b"] {
            module.imports.push(Import {
                module: "env".to_string(),
                field: field.to_string(),
                ty: ImportType::Function(sig),
            });
            module.import_function_type_indices.push(sig);
        }
        module.functions.push(FunctionData {
            signature: sig,
            data: vec![0x0b],
        });
        module
    }

    #[test]
    fn index_space_conversions() {
        let module = module_with_two_imports();
        assert_eq!(module.import_function_count(), 2);

        let local = LocalFunctionIndex::from_u32(0);
        assert_eq!(module.func_index(local), FunctionIndex::from_u32(2));
        assert_eq!(
            module.local_func_index(FunctionIndex::from_u32(2)),
            Some(local)
        );
        assert_eq!(module.local_func_index(FunctionIndex::from_u32(1)), None);
        assert!(module.is_imported_function(FunctionIndex::from_u32(1)));
        assert!(!module.is_imported_function(FunctionIndex::from_u32(2)));
    }
}
