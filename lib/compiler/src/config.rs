//! Tunables controlling how compilation work is batched and dispatched.

use std::thread;

/// Factor deciding when a module counts as "large" for batch sizing: a
/// module whose total function-body size exceeds `LARGE_MODULE_LOOP_FACTOR
/// * small limit * thread count` switches to the large per-batch limit.
///
/// The value is empirically calibrated; treat it as a tunable, not a
/// derivation.
pub const LARGE_MODULE_LOOP_FACTOR: usize = 3;

/// Knobs for the compilation pipeline.
///
/// Defaults match a JIT-enabled build on a multi-core host.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Per-batch byte budget used for small modules.
    pub small_partial_compile_limit: usize,
    /// Per-batch byte budget used once a module is large enough to keep
    /// every compiler thread busy across several rounds.
    pub large_partial_compile_limit: usize,
    /// Whether compilation batches may be claimed by concurrent worker
    /// threads. When false the batch limit never scales up.
    pub use_concurrent_compilation: bool,
    /// Number of compiler threads the driving thread pool runs.
    pub compiler_thread_count: usize,
    /// Whether trampolines are generated by the backend. When false the
    /// interpreter entry points are installed instead.
    pub use_jit: bool,
    /// Log how long validation takes.
    pub report_compile_times: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            small_partial_compile_limit: 5000,
            large_partial_compile_limit: 20000,
            use_concurrent_compilation: true,
            compiler_thread_count: thread::available_parallelism()
                .map(|threads| threads.get())
                .unwrap_or(1),
            use_jit: true,
            report_compile_times: false,
        }
    }
}
