// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::context::TaskContext;
use crate::graph::Graph;
use crate::process::ProcessError;
use crate::subforge::SubforgeError;

/// A task body.  Bodies receive the task's context; a body that has no use
/// for it simply ignores the argument.
pub type TaskBody = Arc<dyn Fn(&mut TaskContext) -> Result<(), TaskError> + Send + Sync>;

/// A failure surfaced from inside a task body.
pub enum TaskError {
    /// The body requested a graceful exit with the given return code.
    Exit(i32),
    Subprocess(ProcessError),
    Subforge(SubforgeError),
    /// Failures collected from one multitask scope.
    Aggregate(Vec<TaskError>),
    Other(anyhow::Error),
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskError({})", self)
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TaskError::Subprocess(e) => Some(e),
            TaskError::Subforge(e) => Some(e),
            TaskError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Exit(code) => write!(f, "exit({}) was called within a task.", code),
            TaskError::Subprocess(e) => write!(f, "{}", e),
            TaskError::Subforge(e) => write!(f, "{}", e),
            TaskError::Aggregate(errors) => {
                write!(f, "{} failure(s) in multitask scope:", errors.len())?;
                for e in errors {
                    write!(f, "\n  {}", e)?;
                }
                Ok(())
            }
            TaskError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl From<ProcessError> for TaskError {
    fn from(e: ProcessError) -> TaskError {
        TaskError::Subprocess(e)
    }
}

impl From<SubforgeError> for TaskError {
    fn from(e: SubforgeError) -> TaskError {
        TaskError::Subforge(e)
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(e: anyhow::Error) -> TaskError {
        TaskError::Other(e)
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> TaskError {
        TaskError::Other(anyhow::Error::new(e))
    }
}

impl From<crate::util::ArgsError> for TaskError {
    fn from(e: crate::util::ArgsError) -> TaskError {
        TaskError::Other(anyhow::Error::new(e))
    }
}

/// A declared task input: a literal path, or a deferred generator invoked
/// at task-run time.
#[derive(Clone)]
pub enum InputSpec {
    Path(String),
    Generator(Arc<dyn Fn() -> anyhow::Result<Vec<String>> + Send + Sync>),
}

impl From<&str> for InputSpec {
    fn from(s: &str) -> InputSpec {
        InputSpec::Path(String::from(s))
    }
}

impl From<String> for InputSpec {
    fn from(s: String) -> InputSpec {
        InputSpec::Path(s)
    }
}

/// A declared task output: a literal path, or a deferred generator that
/// receives the resolved input list.
#[derive(Clone)]
pub enum OutputSpec {
    Path(String),
    Generator(Arc<dyn Fn(&[String]) -> anyhow::Result<Vec<String>> + Send + Sync>),
}

impl From<&str> for OutputSpec {
    fn from(s: &str) -> OutputSpec {
        OutputSpec::Path(String::from(s))
    }
}

impl From<String> for OutputSpec {
    fn from(s: String) -> OutputSpec {
        OutputSpec::Path(s)
    }
}

/// Deferred file input glob.  The glob is not executed until the task
/// executes; recursive `**` patterns are supported.
pub fn glob(pattern: &str) -> InputSpec {
    let pattern = pattern.to_string();
    InputSpec::Generator(Arc::new(move || {
        let entries = glob::glob(&pattern)
            .with_context(|| format!("Invalid glob pattern '{}'", pattern))?;
        let mut results: Vec<String> = Vec::new();
        for entry in entries {
            let path = entry.with_context(|| format!("Error reading glob entry for '{}'", pattern))?;
            results.push(path.to_string_lossy().into_owned());
        }
        Ok(results)
    }))
}

/// Substitution pattern usable in place of an output file list.  `%` is the
/// input file stem, `{dir}` its directory and `{ext}` its extension
/// (including the leading dot).
pub fn pattern(file_pattern: &str) -> OutputSpec {
    let file_pattern = file_pattern.to_string();
    OutputSpec::Generator(Arc::new(move |inputs: &[String]| {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let path = Path::new(input);
            let dir = path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            outputs.push(
                file_pattern
                    .replace("{dir}", &dir)
                    .replace('%', &stem)
                    .replace("{ext}", &ext),
            );
        }
        Ok(outputs)
    }))
}

/// Opaque reference to a registered task, returned by registration.  The
/// Rust rendition of referring to a task by its callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(pub(crate) usize);

/// A dependency or run-target reference: by name, or by handle.
#[derive(Clone)]
pub enum TaskRef {
    Name(String),
    Handle(TaskHandle),
}

impl From<&str> for TaskRef {
    fn from(s: &str) -> TaskRef {
        TaskRef::Name(String::from(s))
    }
}

impl From<String> for TaskRef {
    fn from(s: String) -> TaskRef {
        TaskRef::Name(s)
    }
}

impl From<TaskHandle> for TaskRef {
    fn from(h: TaskHandle) -> TaskRef {
        TaskRef::Handle(h)
    }
}

impl From<&TaskHandle> for TaskRef {
    fn from(h: &TaskHandle) -> TaskRef {
        TaskRef::Handle(*h)
    }
}

/// Declarative part of a task registration.
#[derive(Clone)]
pub struct TaskSpec {
    pub deps: Vec<TaskRef>,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    /// Print the task header line when the task begins executing.
    pub show_header: bool,
    /// Task description shown by --show-task-info.
    pub doc: Option<String>,
}

impl Default for TaskSpec {
    fn default() -> TaskSpec {
        TaskSpec {
            deps: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            show_header: true,
            doc: None,
        }
    }
}

pub struct TaskRecord {
    pub name: Arc<str>,
    pub(crate) body: TaskBody,
    pub(crate) inputs: Vec<InputSpec>,
    pub(crate) outputs: Vec<OutputSpec>,
    pub(crate) show_header: bool,
    pub(crate) doc: Option<String>,
    pub(crate) node: Arc<Graph>,
    pub(crate) handle: TaskHandle,
    /// Direct dependency names in declaration order.
    pub(crate) deps: Vec<Arc<str>>,
}

impl TaskRecord {
    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

#[derive(Debug)]
pub enum RegistryError {
    Redefined(String),
    Undefined(String),
}

impl Error for RegistryError {}
impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Redefined(name) => {
                write!(f, "Error: Task \"{}\" has already been defined.", name)
            }
            RegistryError::Undefined(name) => {
                write!(f, "Error: Task \"{}\" is undefined.", name)
            }
        }
    }
}

/// Name-indexed store of task records.  Owns every graph node; dependency
/// edges between nodes are weak.
pub struct TaskRegistry {
    tasks: Vec<Arc<TaskRecord>>,
    by_name: HashMap<Arc<str>, usize>,
}

impl TaskRegistry {
    pub fn new() -> TaskRegistry {
        TaskRegistry {
            tasks: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn add(
        &mut self,
        name: &str,
        spec: TaskSpec,
        body: TaskBody,
    ) -> Result<TaskHandle, RegistryError> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::Redefined(String::from(name)));
        }

        // Dependencies must be declared before their dependents
        let mut dep_records: Vec<Arc<TaskRecord>> = Vec::with_capacity(spec.deps.len());
        for dep in spec.deps.iter() {
            dep_records.push(self.get(dep)?.clone());
        }

        let node = Graph::new(name);
        for dep in dep_records.iter() {
            node.add_edge(&dep.node);
        }

        let handle = TaskHandle(self.tasks.len());
        let record = Arc::new(TaskRecord {
            name: node.name(),
            body,
            inputs: spec.inputs,
            outputs: spec.outputs,
            show_header: spec.show_header,
            doc: spec.doc,
            node,
            handle,
            deps: dep_records.iter().map(|d| d.name.clone()).collect(),
        });

        self.by_name.insert(record.name.clone(), handle.0);
        self.tasks.push(record);

        Ok(handle)
    }

    pub fn get(&self, task: &TaskRef) -> Result<&Arc<TaskRecord>, RegistryError> {
        match task {
            TaskRef::Name(name) => self.by_name(name),
            TaskRef::Handle(handle) => self.by_handle(*handle),
        }
    }

    pub fn by_name(&self, name: &str) -> Result<&Arc<TaskRecord>, RegistryError> {
        self.by_name
            .get(name)
            .map(|idx| &self.tasks[*idx])
            .ok_or_else(|| RegistryError::Undefined(String::from(name)))
    }

    pub fn by_handle(&self, handle: TaskHandle) -> Result<&Arc<TaskRecord>, RegistryError> {
        self.tasks
            .get(handle.0)
            .ok_or_else(|| RegistryError::Undefined(format!("#{}", handle.0)))
    }

    /// All registered tasks, in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<TaskRecord>> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
