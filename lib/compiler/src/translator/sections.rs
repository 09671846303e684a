//! Helper functions to gather information for each of the sections of a
//! WebAssembly module.
//!
//! The code of these helper functions is straightforward since they only
//! read metadata about functions, imports, exports and element segments
//! and store it for later use. Sections the compilation pipeline never
//! consults (tables, memories, globals, data) are validated upstream and
//! skipped here.

use super::environ::ModuleEnvironment;
use super::error::from_binary_reader_error;
use tern_types::{
    ElementInit, ElementSegment, Export, ExportIndex, FunctionIndex, FunctionType, ImportType,
    SignatureIndex, Type, WasmError, WasmResult,
};
use wasmparser::{
    ConstExpr, ElementItems, ElementSectionReader, ExportSectionReader, ExternalKind,
    FunctionBody, FunctionSectionReader, ImportSectionReader, Operator, TypeRef,
    TypeSectionReader, ValType,
};

/// Helper function translating wasmparser types to Tern value types.
pub fn wptype_to_type(ty: ValType) -> WasmResult<Type> {
    match ty {
        ValType::I32 => Ok(Type::I32),
        ValType::I64 => Ok(Type::I64),
        ValType::F32 => Ok(Type::F32),
        ValType::F64 => Ok(Type::F64),
        ValType::V128 => Ok(Type::V128),
        ValType::Ref(ty) if ty.is_func_ref() => Ok(Type::FuncRef),
        ValType::Ref(ty) if ty.is_extern_ref() => Ok(Type::ExternRef),
        ty => Err(WasmError::Unsupported(format!(
            "wptype_to_type: wasmparser type {ty:?}"
        ))),
    }
}

/// Parses the Type section of the wasm module.
pub fn parse_type_section(
    types: TypeSectionReader,
    environ: &mut ModuleEnvironment,
) -> WasmResult<()> {
    environ.reserve_entries(types.count())?;

    for entry in types.into_iter_err_on_gc_types() {
        let func_type = entry.map_err(from_binary_reader_error)?;
        let params = func_type
            .params()
            .iter()
            .map(|ty| wptype_to_type(*ty))
            .collect::<WasmResult<Vec<Type>>>()?;
        let results = func_type
            .results()
            .iter()
            .map(|ty| wptype_to_type(*ty))
            .collect::<WasmResult<Vec<Type>>>()?;
        environ.declare_signature(FunctionType::new(params, results))?;
    }

    Ok(())
}

/// Parses the Import section of the wasm module.
pub fn parse_import_section(
    imports: ImportSectionReader,
    environ: &mut ModuleEnvironment,
) -> WasmResult<()> {
    environ.reserve_entries(imports.count())?;

    for entry in imports {
        let import = entry.map_err(from_binary_reader_error)?;
        match import.ty {
            TypeRef::Func(sig) => {
                environ.declare_func_import(
                    SignatureIndex::from_u32(sig),
                    import.module,
                    import.name,
                )?;
            }
            TypeRef::Table(_) => {
                environ.declare_other_import(ImportType::Table, import.module, import.name)?;
            }
            TypeRef::Memory(_) => {
                environ.declare_other_import(ImportType::Memory, import.module, import.name)?;
            }
            TypeRef::Global(_) => {
                environ.declare_other_import(ImportType::Global, import.module, import.name)?;
            }
            TypeRef::Tag(_) => {
                environ.declare_other_import(ImportType::Tag, import.module, import.name)?;
            }
        }
    }

    Ok(())
}

/// Parses the Function section of the wasm module.
pub fn parse_function_section(
    functions: FunctionSectionReader,
    environ: &mut ModuleEnvironment,
) -> WasmResult<()> {
    environ.reserve_entries(functions.count())?;

    for entry in functions {
        let sig_index = entry.map_err(from_binary_reader_error)?;
        environ.declare_func_type(SignatureIndex::from_u32(sig_index))?;
    }

    Ok(())
}

/// Parses the Export section of the wasm module.
pub fn parse_export_section(
    exports: ExportSectionReader,
    environ: &mut ModuleEnvironment,
) -> WasmResult<()> {
    environ.reserve_entries(exports.count())?;

    for entry in exports {
        let export = entry.map_err(from_binary_reader_error)?;
        let index = match export.kind {
            ExternalKind::Func => ExportIndex::Function(FunctionIndex::from_u32(export.index)),
            ExternalKind::Table => ExportIndex::Table(export.index),
            ExternalKind::Memory => ExportIndex::Memory(export.index),
            ExternalKind::Global => ExportIndex::Global(export.index),
            ExternalKind::Tag => ExportIndex::Tag(export.index),
        };
        environ.declare_export(Export {
            name: export.name.to_string(),
            index,
        })?;
    }

    Ok(())
}

/// Parses the Start section of the wasm module.
pub fn parse_start_section(func: u32, environ: &mut ModuleEnvironment) -> WasmResult<()> {
    environ.declare_start_function(FunctionIndex::from_u32(func))
}

/// Parses the Element section of the wasm module.
///
/// Only the slot initializers are kept: a `ref.func` entry pins the
/// referenced function as externally observable, everything else is
/// recorded as an opaque initializer.
pub fn parse_element_section(
    elements: ElementSectionReader,
    environ: &mut ModuleEnvironment,
) -> WasmResult<()> {
    environ.reserve_entries(elements.count())?;

    for entry in elements {
        let element = entry.map_err(from_binary_reader_error)?;
        let mut items = Vec::new();
        match element.items {
            ElementItems::Functions(funcs) => {
                for func in funcs {
                    let func = func.map_err(from_binary_reader_error)?;
                    items.push(ElementInit::RefFunc(FunctionIndex::from_u32(func)));
                }
            }
            ElementItems::Expressions(_ty, exprs) => {
                for expr in exprs {
                    let expr = expr.map_err(from_binary_reader_error)?;
                    items.push(element_init_from_expr(&expr)?);
                }
            }
        }
        environ.declare_element_segment(ElementSegment { items })?;
    }

    Ok(())
}

fn element_init_from_expr(expr: &ConstExpr) -> WasmResult<ElementInit> {
    let mut ops = expr.get_operators_reader();
    match ops.read().map_err(from_binary_reader_error)? {
        Operator::RefFunc { function_index } => Ok(ElementInit::RefFunc(
            FunctionIndex::from_u32(function_index),
        )),
        Operator::RefNull { .. } => Ok(ElementInit::RefNull),
        _ => Ok(ElementInit::Other),
    }
}

/// Parses one entry of the Code section of the wasm module.
pub fn parse_code_section_entry(
    body: &FunctionBody,
    environ: &mut ModuleEnvironment,
) -> WasmResult<()> {
    environ.define_function_body(body.as_bytes())
}
