// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::env;
use std::error::Error;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::process::{run_process, CallOptions, ProcessError, SubprocessFailure};
use crate::util::ArgsError;
use crate::values::Value;

/// A nested forgefile invocation that exited with a non-zero return code.
/// Distinguishable from a plain subprocess failure by its kind.
#[derive(Debug)]
pub struct SubforgeError(pub SubprocessFailure);

impl Error for SubforgeError {}
impl fmt::Display for SubforgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SubforgeError {
    pub fn write_info(&mut self, writer: &mut dyn Write) -> std::io::Result<()> {
        self.0.write_info(writer)
    }
}

#[derive(Debug)]
pub enum SubforgeCallError {
    ScriptNotFound(String),
    Args(ArgsError),
    Process(ProcessError),
    Failed(SubforgeError),
}

impl Error for SubforgeCallError {}
impl fmt::Display for SubforgeCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubforgeCallError::ScriptNotFound(script) => {
                write!(f, "forgefile: \"{}\" does not exist.", script)
            }
            SubforgeCallError::Args(e) => write!(f, "{}", e),
            SubforgeCallError::Process(e) => write!(f, "{}", e),
            SubforgeCallError::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Compute the argv for a child invocation: the script itself, one
/// `-D name=literal` pair per export, the child's depth, a directory
/// change when the script lives elsewhere, then the user arguments.
pub fn subforge_command(
    exports: &[(String, Value)],
    depth: usize,
    args: &[String],
) -> Result<Vec<String>, SubforgeCallError> {
    if args.is_empty() {
        return Err(SubforgeCallError::Args(ArgsError::Empty));
    }

    let script = &args[0];
    let script_path = Path::new(script);
    if !script_path.is_file() {
        return Err(SubforgeCallError::ScriptNotFound(script.clone()));
    }

    // Scripts are spawned directly; a bare file name needs the explicit
    // current-directory prefix to resolve
    let spawn_path = if script_path.components().count() > 1 {
        script.clone()
    } else {
        format!(".{}{}", std::path::MAIN_SEPARATOR, script)
    };

    let mut argv: Vec<String> = vec![spawn_path];

    for (name, value) in exports {
        argv.push(String::from("-D"));
        argv.push(format!("{}={}", name, value));
    }

    argv.push(String::from("--s_depth"));
    argv.push((depth + 1).to_string());

    let script_dir = script_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let script_dir = dunce::canonicalize(&script_dir).unwrap_or(script_dir);
    let cwd = env::current_dir().ok().and_then(|d| dunce::canonicalize(d).ok());

    if cwd.as_deref() != Some(script_dir.as_path()) {
        argv.push(String::from("--directory"));
        argv.push(script_dir.to_string_lossy().into_owned());
    }

    argv.extend(args[1..].iter().cloned());

    Ok(argv)
}

/// Run another forgefile as a child process, teeing its combined stdout
/// and stderr into `out` and a spill buffer.
pub fn run_subforge(
    exports: &[(String, Value)],
    depth: usize,
    args: Vec<String>,
    out: Option<&mut dyn Write>,
    silent: bool,
) -> Result<(), SubforgeCallError> {
    let argv = subforge_command(exports, depth, &args)?;

    let opts = CallOptions {
        silent,
        print_cmd: false,
        ..CallOptions::default()
    };

    match run_process(&argv, &opts, out) {
        Ok(_) => Ok(()),
        Err(ProcessError::Failed(mut failure)) => {
            failure.message = String::from(
                "An exceptional condition occurred inside a forgefile ran by subforge.",
            );
            Err(SubforgeCallError::Failed(SubforgeError(failure)))
        }
        Err(other) => Err(SubforgeCallError::Process(other)),
    }
}
