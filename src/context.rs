// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::sync::Arc;

use crate::concurrent_io::TaskIo;
use crate::detect::Outdated;
use crate::executor::{JobHandle, WorkerPool};
use crate::forge::Forge;
use crate::process::{self, CallOptions, ProcessError};
use crate::subforge::{run_subforge, SubforgeCallError};
use crate::task::{TaskError, TaskRecord};
use crate::util::{require_command, IntoArgs};

const SUBPROCESS_ERROR_MESSAGE: &str =
    "An error occurred while executing a system command inside a forge task.";

/// Contextual object passed to each task body.  Created just before the
/// body runs, populated by change detection, destroyed when the body
/// returns.
pub struct TaskContext {
    forge: Arc<Forge>,
    task: Arc<TaskRecord>,
    /// All resolved file inputs, or an empty list.
    pub inputs: Vec<String>,
    /// All resolved file outputs, or an empty list.
    pub outputs: Vec<String>,
    /// Inputs that changed, or whose compared output is missing.
    pub outdated_inputs: Vec<String>,
    /// Outputs that are missing or older than a compared input.
    pub outdated_outputs: Vec<String>,
    pub(crate) io: TaskIo,
}

impl TaskContext {
    pub(crate) fn new(
        forge: Arc<Forge>,
        task: Arc<TaskRecord>,
        inputs: Vec<String>,
        outputs: Vec<String>,
        outdated: Outdated,
        io: TaskIo,
    ) -> TaskContext {
        TaskContext {
            forge,
            task,
            inputs,
            outputs,
            outdated_inputs: outdated.inputs,
            outdated_outputs: outdated.outputs,
            io,
        }
    }

    pub(crate) fn into_io(self) -> TaskIo {
        self.io
    }

    pub fn name(&self) -> &str {
        self.task.name.as_ref()
    }

    pub fn forge(&self) -> &Arc<Forge> {
        &self.forge
    }

    /// The task's output stream.  Everything a task wants displayed goes
    /// through here.
    pub fn io(&mut self) -> &mut TaskIo {
        &mut self.io
    }

    /// Write a line to the task's output.
    pub fn print(&mut self, text: impl AsRef<str>) {
        self.io.write_line(text.as_ref());
    }

    /// Paired `(outdated_input, outdated_output)` entries.  Only meaningful
    /// when the two lists have the same length.
    pub fn outdated_pairs(&self) -> impl Iterator<Item = (&String, &String)> {
        self.outdated_inputs.iter().zip(self.outdated_outputs.iter())
    }

    /// Spawn a subprocess, writing its merged stdout and stderr to the
    /// task's output.  Returns the exit code; a non-zero exit is an error
    /// unless `ignore_errors` is set.
    pub fn call<A: IntoArgs>(&mut self, args: A, opts: &CallOptions) -> Result<i32, TaskError> {
        let argv = require_command(args.into_args()?)?;

        if opts.print_cmd {
            self.print(argv.join(" "));
        }

        match process::run_process(&argv, opts, Some(&mut self.io)) {
            Ok(outcome) => Ok(outcome.code),
            Err(e) => Err(TaskError::Subprocess(tag_subprocess_error(e))),
        }
    }

    /// Run a command, discarding its output.  Fails on non-zero exit unless
    /// `ignore_errors` is set.
    pub fn check_call<A: IntoArgs>(
        &mut self,
        args: A,
        opts: &CallOptions,
    ) -> Result<i32, TaskError> {
        let argv = require_command(args.into_args()?)?;

        let mut opts = opts.clone();
        opts.silent = true;
        opts.print_cmd = false;

        match process::run_process(&argv, &opts, None) {
            Ok(outcome) => Ok(outcome.code),
            Err(e) => Err(TaskError::Subprocess(tag_subprocess_error(e))),
        }
    }

    /// Run a command and return its merged stdout and stderr.  Fails on
    /// non-zero exit unless `ignore_errors` is set.
    pub fn check_output<A: IntoArgs>(
        &mut self,
        args: A,
        opts: &CallOptions,
    ) -> Result<Vec<u8>, TaskError> {
        let argv = require_command(args.into_args()?)?;

        process::check_output(&argv, opts)
            .map_err(|e| TaskError::Subprocess(tag_subprocess_error(e)))
    }

    /// Run another forgefile, directing its output to this task's output
    /// stream and forwarding the engine's exports.
    pub fn subforge<A: IntoArgs>(&mut self, args: A) -> Result<(), TaskError> {
        let argv = args.into_args()?;
        let exports = self.forge.exports_snapshot();
        let depth = self.forge.subforge_depth();

        match run_subforge(&exports, depth, argv, Some(&mut self.io), false) {
            Ok(()) => Ok(()),
            Err(SubforgeCallError::Failed(e)) => Err(TaskError::Subforge(e)),
            Err(SubforgeCallError::Process(e)) => Err(TaskError::Subprocess(e)),
            Err(SubforgeCallError::ScriptNotFound(script)) => Err(TaskError::Other(
                anyhow::anyhow!("forgefile: \"{}\" does not exist.", script),
            )),
            Err(SubforgeCallError::Args(e)) => Err(e.into()),
        }
    }

    /// The flattened resolved outputs of this task's direct dependencies.
    pub fn dependency_outputs(&self) -> Vec<String> {
        self.forge.dependency_outputs_of(&self.task)
    }

    /// A scoped handle for submitting nested work items to the engine's
    /// current worker pool.
    pub fn multitask(&mut self) -> MultitaskContext {
        MultitaskContext {
            pool: self.forge.current_pool(),
            pending: Vec::new(),
            aggregate: self.forge.aggregate_exceptions(),
        }
    }
}

fn tag_subprocess_error(e: ProcessError) -> ProcessError {
    match e {
        ProcessError::Failed(mut failure) => {
            failure.message = String::from(SUBPROCESS_ERROR_MESSAGE);
            ProcessError::Failed(failure)
        }
        other => other,
    }
}

/// Scope for submitting nested work to the engine's worker pool.  When no
/// pool is running (jobs = 1), submitted work executes immediately on the
/// current thread, keeping caller code identical across modes.
///
/// `join` awaits every submission; dropping the scope without joining also
/// awaits them but swallows their failures.
pub struct MultitaskContext {
    pool: Option<Arc<WorkerPool>>,
    pending: Vec<JobHandle<Result<(), TaskError>>>,
    aggregate: bool,
}

impl MultitaskContext {
    pub fn submit<F>(&mut self, work: F)
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        let handle = match &self.pool {
            Some(pool) => pool.submit_with_handle(work),
            None => JobHandle::resolved(work()),
        };
        self.pending.push(handle);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Await all submissions.  With aggregate exceptions enabled on the
    /// engine, every failure is collected; otherwise the first one wins.
    pub fn join(mut self) -> Result<(), TaskError> {
        let pending = std::mem::take(&mut self.pending);
        let mut failures: Vec<TaskError> = Vec::new();

        for handle in pending {
            if let Err(e) = handle.take() {
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else if self.aggregate {
            Err(TaskError::Aggregate(failures))
        } else {
            Err(failures.remove(0))
        }
    }
}

impl Drop for MultitaskContext {
    fn drop(&mut self) {
        for handle in self.pending.drain(..) {
            let _ = handle.take();
        }
    }
}
