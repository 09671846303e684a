//! The engine: owns a backend and drives plans over a worker pool.

use crate::artifact::Artifact;
use crate::compiler::Compiler;
use crate::config::CompileOptions;
use crate::error::CompileError;
use crate::plan::{CompletionTask, Plan};
use std::sync::Arc;
use tern_types::Features;

/// A compilation engine tying together a backend, a feature set and the
/// batching options.
#[derive(Clone)]
pub struct Engine {
    compiler: Arc<dyn Compiler>,
    features: Features,
    options: CompileOptions,
}

impl Engine {
    /// Creates an engine around the given backend.
    pub fn new(compiler: Arc<dyn Compiler>, features: Features, options: CompileOptions) -> Self {
        Self {
            compiler,
            features,
            options,
        }
    }

    /// The feature set modules are validated against.
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// The batching and dispatch options.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compiles a module binary and blocks until its plan completes.
    ///
    /// Function compilation fans out over `compiler_thread_count` scoped
    /// workers, each claiming batches until none remain; the last worker
    /// out completes the plan and the result comes back over a channel.
    pub fn compile(&self, data: &[u8]) -> Result<Arc<Artifact>, CompileError> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let task: CompletionTask = Box::new(move |result| {
            let _ = sender.send(result);
        });
        let plan = Plan::from_binary(
            self.compiler.clone(),
            self.features.clone(),
            self.options.clone(),
            task,
        );

        if plan.parse_and_validate_module(data) {
            plan.prepare();
        }

        if !plan.failed() {
            let thread_count = if self.options.use_concurrent_compilation {
                self.options.compiler_thread_count.max(1)
            } else {
                1
            };
            let plan = &plan;
            rayon::scope(|scope| {
                for _ in 0..thread_count {
                    scope.spawn(move |_| {
                        while plan.has_work() {
                            plan.compile_functions();
                        }
                    });
                }
            });
        }

        // Covers the no-function and early-failure paths, where no worker
        // ever entered the plan.
        plan.complete_sync_if_possible();

        receiver
            .recv()
            .map_err(|_| CompileError::Codegen("the plan completed without a result".to_string()))?
    }
}
