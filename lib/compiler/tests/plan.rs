//! End-to-end and concurrency tests for the compilation plan.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tern_compiler::{
    CompileError, CompileOptions, CompiledFunction, Compiler, CompletionTask, Engine, Features,
    FunctionBody, Plan, State, Trampoline,
};
use tern_types::{LocalFunctionIndex, ModuleInfo, SignatureIndex};

/// A backend that copies bodies through and counts every call the plan
/// makes into it.
#[derive(Default)]
struct CountingCompiler {
    compiled_indices: Mutex<Vec<u32>>,
    wasm_to_wasm_generated: AtomicUsize,
    wasm_to_host_generated: AtomicUsize,
    mark_both_exception_models: bool,
}

impl Compiler for CountingCompiler {
    fn compile_function(
        &self,
        module: &ModuleInfo,
        index: LocalFunctionIndex,
        data: &[u8],
    ) -> CompiledFunction {
        if self.mark_both_exception_models {
            module.uses_exceptions.store(true, Ordering::Relaxed);
            module.uses_legacy_exceptions.store(true, Ordering::Relaxed);
        }
        self.compiled_indices
            .lock()
            .unwrap()
            .push(index.as_u32());
        CompiledFunction {
            body: FunctionBody {
                body: data.to_vec(),
            },
            unlinked_wasm_to_wasm_calls: Vec::new(),
        }
    }

    fn wasm_to_wasm_trampoline(
        &self,
        _module: &ModuleInfo,
        _import_function_index: u32,
    ) -> Result<Trampoline, CompileError> {
        self.wasm_to_wasm_generated.fetch_add(1, Ordering::SeqCst);
        Ok(Trampoline::Compiled(FunctionBody::default()))
    }

    fn wasm_to_host_trampoline(
        &self,
        _module: &ModuleInfo,
        _type_index: SignatureIndex,
        _import_function_index: u32,
    ) -> Result<Trampoline, CompileError> {
        self.wasm_to_host_generated.fetch_add(1, Ordering::SeqCst);
        Ok(Trampoline::Compiled(FunctionBody::default()))
    }
}

/// Builds a module with `IMPORT_COUNT` function imports and one local
/// function per entry of `body_sizes`, each body roughly that many bytes.
fn module_with_sized_functions(import_count: u32, body_sizes: &[usize]) -> Vec<u8> {
    use wasm_encoder::{
        CodeSection, EntityType, Function, FunctionSection, ImportSection, Instruction, Module,
        TypeSection,
    };

    let mut types = TypeSection::new();
    types.ty().function([], []);
    let mut imports = ImportSection::new();
    for index in 0..import_count {
        imports.import("env", &format!("import{index}"), EntityType::Function(0));
    }
    let mut functions = FunctionSection::new();
    let mut code = CodeSection::new();
    for &size in body_sizes {
        functions.function(0);
        let mut function = Function::new([]);
        for _ in 0..size {
            function.instruction(&Instruction::Nop);
        }
        function.instruction(&Instruction::End);
        code.function(&function);
    }

    let mut module = Module::new();
    module
        .section(&types)
        .section(&imports)
        .section(&functions)
        .section(&code);
    module.finish()
}

fn counting_task(counter: Arc<AtomicUsize>) -> CompletionTask {
    Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn concurrent_workers_cover_every_function_exactly_once() {
    const WORKERS: usize = 8;
    let body_sizes: Vec<usize> = (0..48).map(|index| (index * 37) % 200 + 1).collect();
    let binary = module_with_sized_functions(3, &body_sizes);

    let compiler = Arc::new(CountingCompiler::default());
    let completions = Arc::new(AtomicUsize::new(0));
    let options = CompileOptions {
        small_partial_compile_limit: 64,
        large_partial_compile_limit: 256,
        use_concurrent_compilation: true,
        compiler_thread_count: WORKERS,
        ..CompileOptions::default()
    };
    let plan = Arc::new(Plan::from_binary(
        compiler.clone(),
        Features::default(),
        options,
        counting_task(completions.clone()),
    ));

    assert!(plan.parse_and_validate_module(&binary));
    plan.prepare();
    assert_eq!(plan.state(), State::Prepared);

    let mut workers = Vec::new();
    for _ in 0..WORKERS {
        let plan = plan.clone();
        workers.push(thread::spawn(move || {
            while plan.has_work() {
                plan.compile_functions();
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    plan.complete_sync_if_possible();

    assert_eq!(plan.state(), State::Completed);
    assert!(!plan.failed());
    // The completion task fired exactly once, whichever thread was last.
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    // Batches covered [0, n) with no index claimed twice or skipped.
    let mut compiled = compiler.compiled_indices.lock().unwrap().clone();
    compiled.sort_unstable();
    let expected: Vec<u32> = (0..body_sizes.len() as u32).collect();
    assert_eq!(compiled, expected);

    // However many threads raced, each trampoline table was generated once.
    assert_eq!(compiler.wasm_to_wasm_generated.load(Ordering::SeqCst), 3);
    assert_eq!(compiler.wasm_to_host_generated.load(Ordering::SeqCst), 3);
}

#[test]
fn engine_compiles_a_small_module_end_to_end() {
    let wat = r#"
        (module
          (import "env" "callback" (func $callback (param i32) (result i32)))
          (func $a (result i32) i32.const 1)
          (func $b (result i32) i32.const 2)
          (func $c (export "c") (result i32) i32.const 3))
    "#;
    let binary = wat::parse_str(wat).unwrap();

    let compiler = Arc::new(CountingCompiler::default());
    let engine = Engine::new(
        compiler.clone(),
        Features::default(),
        CompileOptions {
            compiler_thread_count: 2,
            ..CompileOptions::default()
        },
    );
    let artifact = engine.compile(&binary).unwrap();

    let module = artifact.module_info();
    assert_eq!(module.import_function_count(), 1);
    assert_eq!(artifact.get_function_bodies_ref().len(), 3);
    assert_eq!(artifact.get_wasm_to_wasm_trampolines_ref().len(), 1);
    assert_eq!(artifact.get_wasm_to_host_trampolines_ref().len(), 1);
    assert_eq!(artifact.get_unlinked_wasm_to_wasm_calls_ref().len(), 3);

    // Only $c is observable from outside.
    let expected: HashSet<LocalFunctionIndex> =
        [LocalFunctionIndex::from_u32(2)].into_iter().collect();
    assert_eq!(artifact.exported_function_indices(), &expected);

    // The backend saw the bodies exactly as the module carries them.
    for (index, body) in artifact.get_function_bodies_ref().iter() {
        assert_eq!(body.body, module.functions[index].data);
    }
}

#[test]
fn engine_completes_an_empty_module() {
    let binary = wat::parse_str("(module)").unwrap();
    let compiler = Arc::new(CountingCompiler::default());
    let engine = Engine::new(compiler.clone(), Features::default(), CompileOptions::default());

    let artifact = engine.compile(&binary).unwrap();
    assert_eq!(artifact.get_function_bodies_ref().len(), 0);
    assert!(artifact.get_wasm_to_wasm_trampolines_ref().is_empty());
    assert!(artifact.get_wasm_to_host_trampolines_ref().is_empty());
    assert!(artifact.exported_function_indices().is_empty());
    assert!(compiler.compiled_indices.lock().unwrap().is_empty());
}

#[test]
fn engine_reports_a_parse_failure() {
    let compiler = Arc::new(CountingCompiler::default());
    let engine = Engine::new(compiler, Features::default(), CompileOptions::default());

    let error = engine.compile(b"definitely not wasm").unwrap_err();
    assert!(matches!(error, CompileError::Wasm(_)));
}

#[test]
fn engine_rejects_modules_mixing_exception_models() {
    let binary = module_with_sized_functions(0, &[4, 4]);
    let compiler = Arc::new(CountingCompiler {
        mark_both_exception_models: true,
        ..CountingCompiler::default()
    });
    let engine = Engine::new(compiler, Features::default(), CompileOptions::default());

    let error = engine.compile(&binary).unwrap_err();
    assert_eq!(
        error,
        CompileError::Validate("module uses both legacy exceptions and try_table".to_string())
    );
}

#[test]
fn chunked_bytes_drive_the_same_plan() {
    let binary = module_with_sized_functions(2, &[6, 6, 6]);
    let (first_half, second_half) = binary.split_at(binary.len() / 2);

    let compiler = Arc::new(CountingCompiler::default());
    let completions = Arc::new(AtomicUsize::new(0));
    let plan = Plan::from_binary(
        compiler.clone(),
        Features::default(),
        CompileOptions {
            use_concurrent_compilation: false,
            compiler_thread_count: 1,
            ..CompileOptions::default()
        },
        counting_task(completions.clone()),
    );

    assert!(plan.add_bytes(first_half));
    assert!(plan.add_bytes(second_half));
    assert!(plan.finalize_parse());
    assert_eq!(plan.state(), State::Validated);

    plan.prepare();
    while plan.has_work() {
        plan.compile_functions();
    }
    plan.complete_sync_if_possible();

    assert_eq!(plan.state(), State::Completed);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(compiler.compiled_indices.lock().unwrap().len(), 3);
    assert_eq!(compiler.wasm_to_wasm_generated.load(Ordering::SeqCst), 2);
    assert_eq!(compiler.wasm_to_host_generated.load(Ordering::SeqCst), 2);
}
