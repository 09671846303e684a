//! The concurrent compilation plan.
//!
//! A [`Plan`] drives one module from raw bytes to a compiled [`Artifact`]:
//! it parses and validates, sizes its tables in [`prepare`](Plan::prepare),
//! then lets any number of worker threads claim size-balanced batches of
//! functions through [`compile_functions`](Plan::compile_functions). The
//! last thread to leave with nothing left to claim completes the plan and
//! runs the registered completion tasks, exactly once, whether compilation
//! succeeded or failed.

use crate::artifact::Artifact;
use crate::compiler::Compiler;
use crate::config::{CompileOptions, LARGE_MODULE_LOOP_FACTOR};
use crate::error::CompileError;
use crate::function::{FunctionBody, Trampoline, UnlinkedWasmToWasmCall};
use crate::translator::StreamingParser;
use more_asserts::assert_ge;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tern_types::entity::PrimaryMap;
use tern_types::{
    ElementInit, ExportIndex, Features, ImportType, LocalFunctionIndex, ModuleInfo,
};

/// The lifecycle states of a plan, in the order they are reached.
///
/// The state only ever moves forward; an early fatal failure jumps
/// straight to `Completed` without passing through the middle states.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    /// Constructed from bytes; nothing parsed yet.
    Initial,
    /// The module parsed and validated.
    Validated,
    /// Tables sized, exported-function set computed; ready for workers.
    Prepared,
    /// Every function has been claimed by some batch.
    Compiled,
    /// Completion tasks have run; the plan is inert.
    Completed,
}

/// A single-shot callback observing the plan's terminal result.
pub type CompletionTask = Box<dyn FnOnce(Result<Arc<Artifact>, CompileError>) + Send>;

type PlanResult = Result<Arc<Artifact>, CompileError>;

const OUT_OF_EXECUTABLE_MEMORY: &str = "out of executable memory at trampoline generation";

/// Everything the plan mutates, guarded by one lock.
struct PlanInner {
    state: State,
    /// Next function index no batch has claimed yet.
    current_index: u32,
    number_of_functions: u32,
    number_of_active_threads: u32,
    error: Option<CompileError>,
    exported_function_indices: HashSet<LocalFunctionIndex>,
    compiled_functions: Vec<Option<FunctionBody>>,
    unlinked_wasm_to_wasm_calls: Vec<Vec<UnlinkedWasmToWasmCall>>,
    wasm_to_wasm_trampolines: Vec<Trampoline>,
    wasm_to_host_trampolines: Vec<Trampoline>,
    completion_tasks: Vec<CompletionTask>,
    result: Option<PlanResult>,
}

impl PlanInner {
    fn failed(&self) -> bool {
        self.error.is_some()
    }

    /// Records a failure. The first failure recorded is the one reported.
    fn fail(&mut self, error: CompileError) {
        if self.error.is_none() {
            tracing::debug!(%error, "compilation failed");
            self.error = Some(error);
        }
    }
}

/// Orchestrates one module's compilation from validated bytes to
/// ready-to-link code.
///
/// A plan is shared behind an [`Arc`] between the driving thread and the
/// worker threads of an ambient pool; the plan itself spawns no threads.
pub struct Plan {
    compiler: Arc<dyn Compiler>,
    features: Features,
    options: CompileOptions,
    parser: Mutex<Option<StreamingParser>>,
    module: OnceLock<Arc<ModuleInfo>>,
    inner: Mutex<PlanInner>,
    /// One-shot latch: the thread that flips it owns generating the
    /// wasm-to-wasm trampoline table.
    wasm_to_wasm_trampolines_started: AtomicBool,
    /// Same, for the wasm-to-host table.
    wasm_to_host_trampolines_started: AtomicBool,
}

impl Plan {
    /// Creates a plan that parses and validates its module from bytes fed
    /// through [`add_bytes`](Plan::add_bytes) or
    /// [`parse_and_validate_module`](Plan::parse_and_validate_module).
    pub fn from_binary(
        compiler: Arc<dyn Compiler>,
        features: Features,
        options: CompileOptions,
        task: CompletionTask,
    ) -> Self {
        let parser = StreamingParser::new(&features);
        Self::new_inner(compiler, features, options, Some(parser), None, State::Initial, task)
    }

    /// Creates a plan over an already-parsed module, starting in the
    /// `Validated` state.
    pub fn from_module_info(
        compiler: Arc<dyn Compiler>,
        module: Arc<ModuleInfo>,
        options: CompileOptions,
        task: CompletionTask,
    ) -> Self {
        Self::new_inner(
            compiler,
            Features::default(),
            options,
            None,
            Some(module),
            State::Validated,
            task,
        )
    }

    fn new_inner(
        compiler: Arc<dyn Compiler>,
        features: Features,
        options: CompileOptions,
        parser: Option<StreamingParser>,
        module: Option<Arc<ModuleInfo>>,
        state: State,
        task: CompletionTask,
    ) -> Self {
        let module_cell = OnceLock::new();
        if let Some(module) = module {
            let _ = module_cell.set(module);
        }
        Self {
            compiler,
            features,
            options,
            parser: Mutex::new(parser),
            module: module_cell,
            inner: Mutex::new(PlanInner {
                state,
                current_index: 0,
                number_of_functions: 0,
                number_of_active_threads: 0,
                error: None,
                exported_function_indices: HashSet::new(),
                compiled_functions: Vec::new(),
                unlinked_wasm_to_wasm_calls: Vec::new(),
                wasm_to_wasm_trampolines: Vec::new(),
                wasm_to_host_trampolines: Vec::new(),
                completion_tasks: vec![task],
                result: None,
            }),
            wasm_to_wasm_trampolines_started: AtomicBool::new(false),
            wasm_to_host_trampolines_started: AtomicBool::new(false),
        }
    }

    /// The lifecycle state the plan has reached.
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Whether a failure has been recorded.
    pub fn failed(&self) -> bool {
        self.inner.lock().failed()
    }

    /// The first failure recorded, if any.
    pub fn error(&self) -> Option<CompileError> {
        self.inner.lock().error.clone()
    }

    /// The feature set the module is validated against.
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// The module being compiled, once it is available.
    pub fn module_info(&self) -> Option<&Arc<ModuleInfo>> {
        self.module.get()
    }

    fn module(&self) -> &Arc<ModuleInfo> {
        self.module
            .get()
            .expect("the module exists once the plan is validated")
    }

    fn move_to_state(inner: &mut PlanInner, state: State) {
        assert_ge!(state, inner.state, "the plan state only moves forward");
        if state != inner.state {
            tracing::trace!(from = ?inner.state, to = ?state, "moving to state");
        }
        inner.state = state;
    }

    /// Feeds a chunk of the module binary to the streaming parser.
    ///
    /// Returns `false` if the plan has already failed.
    pub fn add_bytes(&self, bytes: &[u8]) -> bool {
        if let Some(parser) = self.parser.lock().as_mut() {
            parser.add_bytes(bytes);
        }
        !self.inner.lock().failed()
    }

    /// Finishes the streaming parse.
    ///
    /// On success the plan moves to `Validated` and returns `true`; on
    /// failure the parser's diagnostic is recorded and `false` comes back.
    pub fn finalize_parse(&self) -> bool {
        let Some(parser) = self.parser.lock().take() else {
            return !self.inner.lock().failed();
        };
        match parser.finalize() {
            Ok(module) => {
                let _ = self.module.set(Arc::new(module));
                let mut inner = self.inner.lock();
                Self::move_to_state(&mut inner, State::Validated);
                true
            }
            Err(error) => {
                self.inner.lock().fail(CompileError::Wasm(error));
                false
            }
        }
    }

    /// Parses and validates the whole remaining module binary.
    ///
    /// A no-op returning `true` once the plan is already validated. The
    /// bytes may also arrive in chunks through
    /// [`add_bytes`](Plan::add_bytes) followed by one
    /// [`finalize_parse`](Plan::finalize_parse) call.
    pub fn parse_and_validate_module(&self, bytes: &[u8]) -> bool {
        if self.inner.lock().state != State::Initial {
            return true;
        }
        tracing::trace!("starting validation");
        let start = self.options.report_compile_times.then(Instant::now);
        if !self.add_bytes(bytes) {
            return false;
        }
        let validated = self.finalize_parse();
        if let Some(start) = start {
            tracing::debug!(
                elapsed_us = start.elapsed().as_micros() as u64,
                "validated module"
            );
        }
        validated
    }

    /// Sizes the plan's tables and computes the set of local functions that
    /// are observable from outside the module.
    ///
    /// Must be called exactly once, on a validated plan; calling it in any
    /// other state is a programming error. Failures (the reservations are
    /// fallible) are recorded on the plan and leave the state at
    /// `Validated`.
    pub fn prepare(&self) {
        let mut inner = self.inner.lock();
        assert_eq!(
            inner.state,
            State::Validated,
            "prepare() requires a validated plan"
        );
        tracing::trace!("starting preparation");

        let module = self.module();
        let import_function_count = module.import_function_count();
        inner.number_of_functions = module.functions.len() as u32;

        if let Err(error) = try_reserve_capacity(
            &mut inner.wasm_to_wasm_trampolines,
            import_function_count,
            "wasm-to-wasm exit trampolines",
        ) {
            inner.fail(error);
            return;
        }
        if let Err(error) = try_reserve_capacity(
            &mut inner.wasm_to_host_trampolines,
            import_function_count,
            "wasm-to-host exit trampolines",
        ) {
            inner.fail(error);
            return;
        }
        if let Err(error) = try_reserve_capacity(
            &mut inner.unlinked_wasm_to_wasm_calls,
            module.functions.len(),
            "unlinked wasm-to-wasm calls",
        ) {
            inner.fail(error);
            return;
        }
        if let Err(error) = try_reserve_capacity(
            &mut inner.compiled_functions,
            module.functions.len(),
            "compiled function bodies",
        ) {
            inner.fail(error);
            return;
        }

        inner
            .unlinked_wasm_to_wasm_calls
            .resize_with(module.functions.len(), Vec::new);
        inner
            .compiled_functions
            .resize_with(module.functions.len(), || None);

        for export in &module.exports {
            if let ExportIndex::Function(func) = export.index {
                if let Some(local) = module.local_func_index(func) {
                    inner.exported_function_indices.insert(local);
                }
            }
        }
        for element in &module.elements {
            for item in &element.items {
                if let ElementInit::RefFunc(func) = *item {
                    if let Some(local) = module.local_func_index(func) {
                        inner.exported_function_indices.insert(local);
                    }
                }
            }
        }
        if let Some(start_function) = module.start_function {
            if let Some(local) = module.local_func_index(start_function) {
                inner.exported_function_indices.insert(local);
            }
        }

        if let Err(error) = self.compiler.prepare(module) {
            inner.fail(error);
            return;
        }

        Self::move_to_state(&mut inner, State::Prepared);
    }

    /// Whether another `compile_functions()` call can still claim a batch.
    pub fn has_work(&self) -> bool {
        let inner = self.inner.lock();
        !inner.failed() && inner.current_index < inner.number_of_functions
    }

    /// Claims one batch of functions and compiles it.
    ///
    /// This is the concurrency entry point: any number of threads may call
    /// it at once, and drivers call it in a loop while
    /// [`has_work`](Plan::has_work) holds. A call that finds nothing left
    /// to claim advances the state machine instead, and completes the plan
    /// when it is the last thread standing.
    pub fn compile_functions(&self) {
        let (function_index, function_index_end, generate_wasm_to_wasm, generate_wasm_to_host) = {
            let mut inner = self.inner.lock();
            assert_ge!(
                inner.state,
                State::Prepared,
                "compile_functions() requires a prepared plan"
            );
            if inner.failed() || inner.current_index >= inner.number_of_functions {
                self.finish_claiming(&mut inner);
                return;
            }

            inner.number_of_active_threads += 1;

            let module = self.module();
            let limit = partial_compile_limit(module.total_function_size, &self.options);
            let function_index = inner.current_index;
            let function_index_end =
                next_batch_end(module, function_index, inner.number_of_functions, limit);
            tracing::trace!(
                start = function_index,
                end = function_index_end,
                limit,
                "claimed batch"
            );
            inner.current_index = function_index_end;

            let generate_wasm_to_wasm = !self
                .wasm_to_wasm_trampolines_started
                .swap(true, Ordering::AcqRel);
            let generate_wasm_to_host = !self
                .wasm_to_host_trampolines_started
                .swap(true, Ordering::AcqRel);
            (
                function_index,
                function_index_end,
                generate_wasm_to_wasm,
                generate_wasm_to_host,
            )
        };
        let _guard = ThreadCountGuard { plan: self };

        let module = self.module().clone();
        for index in function_index..function_index_end {
            let local = LocalFunctionIndex::from_u32(index);
            let compiled =
                self.compiler
                    .compile_function(&module, local, &module.functions[local].data);
            let mut inner = self.inner.lock();
            inner.unlinked_wasm_to_wasm_calls[index as usize] =
                compiled.unlinked_wasm_to_wasm_calls;
            inner.compiled_functions[index as usize] = Some(compiled.body);
        }

        // The two models can only be told apart once bodies have been
        // decoded, so the check lives here rather than in prepare().
        if module.uses_exceptions.load(Ordering::Relaxed)
            && module.uses_legacy_exceptions.load(Ordering::Relaxed)
        {
            self.inner.lock().fail(CompileError::Validate(
                "module uses both legacy exceptions and try_table".to_string(),
            ));
            return;
        }

        if generate_wasm_to_wasm {
            match self.generate_wasm_to_wasm_trampolines() {
                Ok(trampolines) => self.inner.lock().wasm_to_wasm_trampolines = trampolines,
                Err(_) => {
                    self.inner
                        .lock()
                        .fail(CompileError::Resource(OUT_OF_EXECUTABLE_MEMORY.to_string()));
                    return;
                }
            }
        }

        if generate_wasm_to_host {
            match self.generate_wasm_to_host_trampolines() {
                Ok(trampolines) => self.inner.lock().wasm_to_host_trampolines = trampolines,
                Err(_) => {
                    self.inner
                        .lock()
                        .fail(CompileError::Resource(OUT_OF_EXECUTABLE_MEMORY.to_string()));
                }
            }
        }
    }

    /// Completes the plan from the calling thread if every function has
    /// been claimed and no worker thread is still inside
    /// [`compile_functions`](Plan::compile_functions).
    ///
    /// Returns `true` when the plan is complete on return; `false` means a
    /// worker is still finishing and the last one out will complete it.
    pub fn complete_sync_if_possible(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.failed() || inner.current_index >= inner.number_of_functions {
            self.finish_claiming(&mut inner);
        }
        inner.state == State::Completed
    }

    /// Registers a callback for the plan's terminal result.
    ///
    /// Runs immediately if the plan has already completed; otherwise it
    /// runs exactly once, from whichever thread drives completion. Tasks
    /// must not call back into the plan.
    pub fn add_completion_task(&self, task: CompletionTask) {
        let mut inner = self.inner.lock();
        if let Some(result) = inner.result.clone() {
            drop(inner);
            task(result);
        } else {
            inner.completion_tasks.push(task);
        }
    }

    /// Nothing is left to claim: advance the state machine, and complete
    /// the plan if no worker is still finishing a batch.
    fn finish_claiming(&self, inner: &mut PlanInner) {
        if !inner.failed()
            && inner.state >= State::Prepared
            && inner.state < State::Compiled
            && inner.current_index >= inner.number_of_functions
        {
            Self::move_to_state(inner, State::Compiled);
        }
        if inner.number_of_active_threads == 0 {
            self.complete(inner);
        }
    }

    /// Runs the terminal steps exactly once: the backend's completion hook
    /// on success, any trampoline table nobody generated yet, the move to
    /// `Completed`, and the completion tasks.
    fn complete(&self, inner: &mut PlanInner) {
        if inner.state == State::Completed {
            return;
        }
        tracing::trace!("starting completion");

        if !inner.failed() && inner.state == State::Compiled {
            self.compiler.did_complete_compilation(self.module());
        }

        self.generate_trampolines_if_necessary(inner);
        Self::move_to_state(inner, State::Completed);
        self.run_completion_tasks(inner);
    }

    fn generate_trampolines_if_necessary(&self, inner: &mut PlanInner) {
        if !self
            .wasm_to_wasm_trampolines_started
            .swap(true, Ordering::AcqRel)
        {
            match self.generate_wasm_to_wasm_trampolines() {
                Ok(trampolines) => inner.wasm_to_wasm_trampolines = trampolines,
                Err(_) => {
                    inner.fail(CompileError::Resource(OUT_OF_EXECUTABLE_MEMORY.to_string()));
                    return;
                }
            }
        }

        if !self
            .wasm_to_host_trampolines_started
            .swap(true, Ordering::AcqRel)
        {
            match self.generate_wasm_to_host_trampolines() {
                Ok(trampolines) => inner.wasm_to_host_trampolines = trampolines,
                Err(_) => {
                    inner.fail(CompileError::Resource(OUT_OF_EXECUTABLE_MEMORY.to_string()));
                }
            }
        }
    }

    /// One entry per Function-kind import, in import order.
    fn generate_wasm_to_wasm_trampolines(&self) -> Result<Vec<Trampoline>, CompileError> {
        let Some(module) = self.module.get() else {
            return Ok(Vec::new());
        };
        let mut trampolines = Vec::with_capacity(module.import_function_count());
        let mut import_function_index = 0u32;
        for import in &module.imports {
            if !matches!(import.ty, ImportType::Function(_)) {
                continue;
            }
            tracing::trace!(
                import_function_index,
                import_module = %import.module,
                import_field = %import.field,
                "processing import function"
            );
            let trampoline = if self.options.use_jit {
                self.compiler
                    .wasm_to_wasm_trampoline(module, import_function_index)?
            } else {
                Trampoline::InterpreterWasmToWasm
            };
            trampolines.push(trampoline);
            import_function_index += 1;
        }
        debug_assert_eq!(import_function_index as usize, module.import_function_count());
        Ok(trampolines)
    }

    /// One entry per import-function slot, indexed by the import-function
    /// index space.
    fn generate_wasm_to_host_trampolines(&self) -> Result<Vec<Trampoline>, CompileError> {
        let Some(module) = self.module.get() else {
            return Ok(Vec::new());
        };
        let import_function_count = module.import_function_count();
        let mut trampolines = Vec::with_capacity(import_function_count);
        for import_function_index in 0..import_function_count {
            let trampoline = if self.options.use_jit {
                let type_index = module.import_function_type_indices[import_function_index];
                self.compiler.wasm_to_host_trampoline(
                    module,
                    type_index,
                    import_function_index as u32,
                )?
            } else {
                Trampoline::InterpreterWasmToHost
            };
            trampolines.push(trampoline);
        }
        Ok(trampolines)
    }

    fn run_completion_tasks(&self, inner: &mut PlanInner) {
        let result = match inner.error.clone() {
            Some(error) => Err(error),
            None => Ok(Arc::new(self.build_artifact(inner))),
        };
        inner.result = Some(result.clone());
        for task in mem::take(&mut inner.completion_tasks) {
            task(result.clone());
        }
    }

    fn build_artifact(&self, inner: &mut PlanInner) -> Artifact {
        let mut functions = PrimaryMap::with_capacity(inner.compiled_functions.len());
        for body in mem::take(&mut inner.compiled_functions) {
            functions.push(body.expect("every claimed function has been compiled"));
        }
        Artifact::new(
            self.module().clone(),
            functions,
            mem::take(&mut inner.wasm_to_wasm_trampolines),
            mem::take(&mut inner.wasm_to_host_trampolines),
            mem::take(&mut inner.unlinked_wasm_to_wasm_calls),
            mem::take(&mut inner.exported_function_indices),
        )
    }
}

/// Holds the active-thread count up for the duration of one
/// `compile_functions` call. The decrement and the completion check form
/// one critical section so the last thread out observes the final claim
/// state.
struct ThreadCountGuard<'a> {
    plan: &'a Plan,
}

impl Drop for ThreadCountGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.plan.inner.lock();
        inner.number_of_active_threads -= 1;
        if inner.number_of_active_threads == 0
            && (inner.failed() || inner.current_index >= inner.number_of_functions)
        {
            self.plan.finish_claiming(&mut inner);
        }
    }
}

fn try_reserve_capacity<T>(
    table: &mut Vec<T>,
    capacity: usize,
    what: &str,
) -> Result<(), CompileError> {
    table.try_reserve_exact(capacity).map_err(|_| {
        CompileError::Resource(format!("out of memory reserving {capacity} {what}"))
    })
}

/// Computes the byte budget for the next batch.
fn partial_compile_limit(total_function_size: usize, options: &CompileOptions) -> usize {
    let mut limit = options.small_partial_compile_limit;
    if options.use_concurrent_compilation {
        // When the size of the wasm binary requires several rounds per
        // thread, use the large limit.
        if total_function_size
            > LARGE_MODULE_LOOP_FACTOR * limit * options.compiler_thread_count
        {
            limit = options.large_partial_compile_limit;
        }
    }
    limit
}

/// Walks forward from `start` and returns the end of a size-balanced
/// batch.
fn next_batch_end(
    module: &ModuleInfo,
    start: u32,
    number_of_functions: u32,
    limit: usize,
) -> u32 {
    let mut end = number_of_functions;
    let mut bytes_accumulated = 0usize;
    for index in start..number_of_functions {
        let byte_size = module.functions[LocalFunctionIndex::from_u32(index)].data.len();
        // If one function is larger than the limit itself, compile it
        // separately from the current sequence so that compilation tasks
        // stay uniform.
        if bytes_accumulated > 0 && byte_size >= limit {
            end = index;
            break;
        }
        bytes_accumulated += byte_size;
        if bytes_accumulated >= limit {
            end = index + 1;
            break;
        }
    }
    end
}
