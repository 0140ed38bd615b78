// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::concurrent_io::{OutputSink, SinkWriter, TaskIo};
use crate::context::TaskContext;
use crate::defines::Defines;
use crate::detect;
use crate::detect::DetectError;
use crate::executor::{JobHandle, WorkerPool};
use crate::graph::{CyclicDependencyError, Graph};
use crate::process::ProcessError;
use crate::program::RunArgs;
use crate::returncodes;
use crate::subforge::{run_subforge, SubforgeCallError};
use crate::task::{
    RegistryError, TaskError, TaskHandle, TaskRecord, TaskRef, TaskRegistry, TaskSpec,
};
use crate::util::IntoArgs;
use crate::values::Value;

/// A failure from `Forge::run` or `Forge::dry_run`.
#[derive(Debug)]
pub enum RunError {
    Undefined(String),
    Cycle(CyclicDependencyError),
    Detect(DetectError),
    TaskExit { task: Arc<str>, code: i32 },
    /// A task body failed; the detailed report already reached the task's
    /// output buffer.
    Task { task: Arc<str>, source: TaskError },
    /// A dependency's failure observed through its completion handle.
    Shared(Arc<RunError>),
    Executor(String),
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunError::Cycle(e) => Some(e),
            RunError::Detect(e) => Some(e),
            RunError::Task { source, .. } => Some(source),
            RunError::Shared(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Undefined(name) => {
                write!(f, "Error: Task \"{}\" is undefined.", name)
            }
            RunError::Cycle(e) => write!(f, "{}", e),
            RunError::Detect(e) => write!(f, "{}", e),
            RunError::TaskExit { task, code } => {
                write!(f, "exit({}) was called within task \"{}\".", code, task)
            }
            RunError::Task { task, source } => {
                write!(f, "Error within task \"{}\": {}", task, source)
            }
            RunError::Shared(e) => write!(f, "{}", e),
            RunError::Executor(msg) => write!(f, "{}", msg),
        }
    }
}

impl RunError {
    /// Map to the stable driver exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Undefined(_) => returncodes::UNDEFINED_TASK,
            RunError::Cycle(_) => returncodes::CYCLIC_DEPENDENCY,
            RunError::Detect(e) => match e {
                DetectError::InputNotFound { .. } => returncodes::TASK_INPUT_NOT_FOUND,
                DetectError::MissingOutputs { .. } => returncodes::TASK_OUTPUT_MISSING,
                DetectError::Io { .. } => returncodes::TASK_EXCEPTION,
            },
            RunError::TaskExit { code, .. } => *code,
            RunError::Task { source, .. } => match source {
                TaskError::Subprocess(ProcessError::Failed(_)) => {
                    returncodes::TASK_SUBPROCESS_EXCEPTION
                }
                TaskError::Subforge(_) => returncodes::SUBFORGE_EXCEPTION,
                _ => returncodes::TASK_EXCEPTION,
            },
            RunError::Shared(inner) => inner.exit_code(),
            RunError::Executor(_) => returncodes::TASK_EXCEPTION,
        }
    }
}

fn registry_error_to_run(e: RegistryError) -> RunError {
    match e {
        RegistryError::Undefined(name) => RunError::Undefined(name),
        RegistryError::Redefined(name) => {
            RunError::Executor(format!("Task \"{}\" unexpectedly redefined.", name))
        }
    }
}

/// Resolved input and output lists of a task that already went through
/// change detection this run.
pub struct ResolvedIo {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

pub struct ForgeConfig {
    /// The stream all task output gets written to.  Defaults to stdout.
    pub stdout: Option<Box<dyn Write + Send>>,
    pub sync_output: bool,
    pub show_task_headers: bool,
    /// Collect every failure from a multitask scope instead of just the
    /// first.
    pub aggregate_exceptions: bool,
    pub subforge_depth: usize,
}

impl Default for ForgeConfig {
    fn default() -> ForgeConfig {
        ForgeConfig {
            stdout: None,
            sync_output: true,
            show_task_headers: true,
            aggregate_exceptions: false,
            subforge_depth: 0,
        }
    }
}

/// The build engine: task registry, define store, export set, scheduler.
pub struct Forge {
    registry: TaskRegistry,
    defines: Defines,
    exports: Mutex<Vec<(String, Value)>>,
    output: Arc<OutputSink>,
    sync_output: bool,
    show_task_headers: bool,
    aggregate_exceptions: bool,
    subforge_depth: usize,
    run_count: AtomicUsize,
    dry_run_mode: AtomicBool,
    pool: Mutex<Option<Arc<WorkerPool>>>,
    resolved: RwLock<HashMap<Arc<str>, Arc<ResolvedIo>>>,
    pub(crate) run_args: Option<RunArgs>,
}

impl Forge {
    pub fn new(config: ForgeConfig) -> Forge {
        let output = match config.stdout {
            Some(writer) => OutputSink::new(writer),
            None => OutputSink::stdout(),
        };

        Forge {
            registry: TaskRegistry::new(),
            defines: Defines::new(),
            exports: Mutex::new(Vec::new()),
            output: Arc::new(output),
            sync_output: config.sync_output,
            show_task_headers: config.show_task_headers,
            aggregate_exceptions: config.aggregate_exceptions,
            subforge_depth: config.subforge_depth,
            run_count: AtomicUsize::new(0),
            dry_run_mode: AtomicBool::new(false),
            pool: Mutex::new(None),
            resolved: RwLock::new(HashMap::new()),
            run_args: None,
        }
    }

    /// Register a task.  Dependencies must already be registered.
    pub fn add_task<F>(
        &mut self,
        name: &str,
        spec: TaskSpec,
        body: F,
    ) -> Result<TaskHandle, RegistryError>
    where
        F: Fn(&mut TaskContext) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.registry.add(name, spec, Arc::new(body))
    }

    pub fn task_count(&self) -> usize {
        self.registry.len()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Arc<TaskRecord>> {
        self.registry.all()
    }

    pub fn task_name(&self, task: &TaskRef) -> Result<Arc<str>, RegistryError> {
        Ok(self.registry.get(task)?.name.clone())
    }

    /// Number of tasks whose body was invoked (including dry-run visits)
    /// by the last run.
    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::Relaxed)
    }

    pub fn defines(&self) -> &Defines {
        &self.defines
    }

    pub fn defines_mut(&mut self) -> &mut Defines {
        &mut self.defines
    }

    pub fn get_define(&self, name: &str) -> Option<&Value> {
        self.defines.get(name)
    }

    pub fn set_define(&mut self, name: impl Into<String>, value: Value) {
        self.defines.set(name, value);
    }

    /// Export a define to be forwarded to every subforge child.
    pub fn export(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut exports = self.exports.lock().unwrap();
        match exports.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => exports.push((name, value)),
        }
    }

    pub fn exports_snapshot(&self) -> Vec<(String, Value)> {
        self.exports.lock().unwrap().clone()
    }

    pub fn subforge_depth(&self) -> usize {
        self.subforge_depth
    }

    pub fn sync_output(&self) -> bool {
        self.sync_output
    }

    /// Write a line to the engine's output stream.
    pub fn print(&self, text: impl AsRef<str>) {
        self.output.write_line(text.as_ref());
    }

    pub(crate) fn current_pool(&self) -> Option<Arc<WorkerPool>> {
        self.pool.lock().unwrap().clone()
    }

    pub(crate) fn aggregate_exceptions(&self) -> bool {
        self.aggregate_exceptions
    }

    /// Run another forgefile from outside any task, directing its output to
    /// the engine stream.  Prefer `TaskContext::subforge` inside tasks.
    pub fn subforge<A: IntoArgs>(&self, args: A) -> anyhow::Result<()> {
        let argv = args
            .into_args()
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let exports = self.exports_snapshot();
        let mut out = SinkWriter(self.output.clone());

        run_subforge(&exports, self.subforge_depth, argv, Some(&mut out), false).map_err(
            |e| match e {
                SubforgeCallError::Failed(mut failure) => {
                    let mut report: Vec<u8> = Vec::new();
                    let _ = failure.write_info(&mut report);
                    anyhow::anyhow!("{}", String::from_utf8_lossy(&report))
                }
                other => anyhow::anyhow!("{}", other),
            },
        )
    }

    /// The flattened resolved outputs of a task's direct dependencies.
    /// Available once those dependencies have gone through change
    /// detection this run.
    pub(crate) fn dependency_outputs_of(&self, task: &TaskRecord) -> Vec<String> {
        let resolved = self.resolved.read().unwrap();
        let mut outputs: Vec<String> = Vec::new();
        for dep in task.deps.iter() {
            if let Some(io) = resolved.get(dep) {
                outputs.extend(io.outputs.iter().cloned());
            }
        }
        outputs
    }

    /// Run the given tasks and their dependencies, with up to `jobs`
    /// bodies executing concurrently.
    pub fn run(self: &Arc<Self>, tasks: &[TaskRef], jobs: usize) -> Result<(), RunError> {
        if jobs < 1 {
            return Err(RunError::Executor(String::from(
                "Job count must be >= 1.",
            )));
        }

        self.run_count.store(0, Ordering::Relaxed);
        self.resolved.write().unwrap().clear();

        // One combined order: per-root topological orders concatenated,
        // duplicates filtered by node identity across roots
        let mut order: Vec<Arc<TaskRecord>> = Vec::new();
        let mut seen: HashSet<*const Graph> = HashSet::new();
        for task in tasks {
            let record = self.registry.get(task).map_err(registry_error_to_run)?;
            let sorted = record.node.topological_sort().map_err(RunError::Cycle)?;
            for node in sorted {
                if seen.insert(Arc::as_ptr(&node)) {
                    let name = node.name();
                    let record = self
                        .registry
                        .by_name(name.as_ref())
                        .expect("graph node names a registered task");
                    order.push(record.clone());
                }
            }
        }

        if jobs == 1 {
            for record in order {
                self.invoke_task(&record)?;
            }
            return Ok(());
        }

        self.run_parallel(order, jobs)
    }

    fn run_parallel(
        self: &Arc<Self>,
        order: Vec<Arc<TaskRecord>>,
        jobs: usize,
    ) -> Result<(), RunError> {
        let pool = Arc::new(WorkerPool::new(jobs));
        *self.pool.lock().unwrap() = Some(pool.clone());

        type Completion = JobHandle<Result<(), Arc<RunError>>>;
        let handles: Arc<Mutex<HashMap<Arc<str>, Completion>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let mut pending: Vec<Completion> = Vec::with_capacity(order.len());

        for record in order {
            let handle: Completion = JobHandle::new();
            handles
                .lock()
                .unwrap()
                .insert(record.name.clone(), handle.clone());
            pending.push(handle.clone());

            let engine = self.clone();
            let handle_map = handles.clone();
            pool.submit(Box::new(move || {
                // Wait on direct dependencies first; a stored failure is
                // re-raised without running the body
                let dep_handles: Vec<Completion> = {
                    let map = handle_map.lock().unwrap();
                    record
                        .deps
                        .iter()
                        .map(|dep| {
                            map.get(dep)
                                .expect("dependency submitted before dependent")
                                .clone()
                        })
                        .collect()
                };

                for dep_handle in dep_handles {
                    if let Err(e) = dep_handle.wait_cloned() {
                        handle.complete(Err(e));
                        return;
                    }
                }

                let result = engine.invoke_task(&record).map_err(Arc::new);
                handle.complete(result);
            }));
        }

        // The first failure wins, but in-flight tasks are not cancelled;
        // everything is awaited before returning
        let mut first_error: Option<Arc<RunError>> = None;
        for handle in pending {
            if let Err(e) = handle.wait_cloned() {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        *self.pool.lock().unwrap() = None;
        drop(pool);

        match first_error {
            Some(e) => Err(RunError::Shared(e)),
            None => Ok(()),
        }
    }

    /// Visit tasks without invoking bodies, printing a visit line for each
    /// task that would run.
    pub fn dry_run(self: &Arc<Self>, tasks: &[TaskRef]) -> Result<(), RunError> {
        self.dry_run_mode.store(true, Ordering::Relaxed);
        let result = self.run(tasks, 1);
        self.dry_run_mode.store(false, Ordering::Relaxed);
        result
    }

    fn invoke_task(self: &Arc<Self>, record: &Arc<TaskRecord>) -> Result<(), RunError> {
        let mut io = TaskIo::new(self.output.clone(), self.sync_output);

        let (inputs, outputs) = match detect::resolve_io(&record.inputs, &record.outputs) {
            Ok(resolved) => resolved,
            Err(e) => {
                let err = TaskError::Other(e);
                io.write_line(&err.to_string());
                io.close();
                return Err(RunError::Task {
                    task: record.name.clone(),
                    source: err,
                });
            }
        };

        self.resolved.write().unwrap().insert(
            record.name.clone(),
            Arc::new(ResolvedIo {
                inputs: inputs.clone(),
                outputs: outputs.clone(),
            }),
        );

        let outdated = match detect::change_detect(&record.name, &inputs, &outputs) {
            Ok(outdated) => outdated,
            Err(e) => {
                io.close();
                return Err(RunError::Detect(e));
            }
        };

        // A task with no declared inputs or outputs always runs; a task
        // with declarations runs only when something is outdated
        let declared = !record.inputs.is_empty() || !record.outputs.is_empty();
        if declared && outdated.inputs.is_empty() && outdated.outputs.is_empty() {
            io.close();
            return Ok(());
        }

        self.run_count.fetch_add(1, Ordering::Relaxed);

        if self.dry_run_mode.load(Ordering::Relaxed) {
            io.write_line(&format!("Visited Task: \"{}\"", record.name));
            io.close();
            return Ok(());
        }

        if record.show_header && self.show_task_headers {
            io.write_line(&format!("===== Executing Task: \"{}\"", record.name));
        }

        let mut ctx = TaskContext::new(
            self.clone(),
            record.clone(),
            inputs,
            outputs,
            outdated,
            io,
        );
        let body_result = (record.body.as_ref())(&mut ctx);
        let mut io = ctx.into_io();

        let result = match body_result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.route_task_error(record, &mut io, err)),
        };

        io.close();
        result
    }

    /// Classify a body failure: subprocess and subforge reports go to the
    /// task's output before wrapping; exits pass through with their code;
    /// everything else is written to the output and wrapped.
    fn route_task_error(
        &self,
        record: &Arc<TaskRecord>,
        io: &mut TaskIo,
        err: TaskError,
    ) -> RunError {
        match err {
            TaskError::Exit(code) => RunError::TaskExit {
                task: record.name.clone(),
                code,
            },
            TaskError::Subprocess(ProcessError::Failed(mut failure)) => {
                let _ = failure.write_info(io);
                RunError::Task {
                    task: record.name.clone(),
                    source: TaskError::Subprocess(ProcessError::Failed(failure)),
                }
            }
            TaskError::Subforge(mut failure) => {
                let _ = failure.write_info(io);
                RunError::Task {
                    task: record.name.clone(),
                    source: TaskError::Subforge(failure),
                }
            }
            other => {
                io.write_line(&other.to_string());
                RunError::Task {
                    task: record.name.clone(),
                    source: other,
                }
            }
        }
    }
}
