// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::env;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser};

use crate::defines::Defines;
use crate::forge::{Forge, ForgeConfig, RunError};
use crate::returncodes;
use crate::task::{TaskRecord, TaskRef};
use crate::util::wrap_text;

pub const SYNC_OUTPUT_ENV: &str = "FORGE_SYNC_OUTPUT";
/// Internal, set by a parent forge process to propagate the effective
/// output-synchronization value to children.  Takes precedence over
/// `FORGE_SYNC_OUTPUT`.
pub const SYNC_OUTPUT_INTERNAL_ENV: &str = "__FORGE_SYNC_OUTPUT";

#[derive(Parser)]
#[command(name = "forge", disable_version_flag = true)]
struct Cli {
    /// Build tasks.
    tasks: Vec<String>,

    /// Add a defined value.
    #[arg(short = 'D', long = "define", value_name = "NAME[=EXPR]", action = ArgAction::Append)]
    define: Vec<String>,

    /// Max number of parallel jobs.  Using this option enables unrelated
    /// tasks to run in parallel with a max of N tasks running at a time.
    #[arg(short = 'j', long = "jobs", value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    jobs: Option<u64>,

    /// Use to perform a dry run, lists all tasks that will be executed in
    /// the next actual invocation.
    #[arg(short = 'n', long = "dry-run", conflicts_with_all = ["jobs", "show_tasks", "show_task_info"])]
    dry_run: bool,

    /// Change directory before executing.
    #[arg(short = 'C', long = "directory", value_name = "DIR")]
    directory: Option<PathBuf>,

    /// List all task names.
    #[arg(short = 't', long = "show-tasks", conflicts_with_all = ["show_task_info", "jobs", "tasks", "stdin_defines"])]
    show_tasks: bool,

    /// List all tasks along side their doc string.  Only tasks with doc
    /// strings present will be shown.
    #[arg(long = "show-task-info", alias = "ti", conflicts_with_all = ["dry_run", "jobs", "tasks", "stdin_defines"])]
    show_task_info: bool,

    /// Read defines from a dictionary literal piped into stdin.  Defines
    /// read with this option can be overwritten by defines specified on
    /// the command line with -D/--define.
    #[arg(long = "stdin-defines")]
    stdin_defines: bool,

    /// Override output synchronization (1/0/true/false).
    #[arg(long = "sync-output", value_name = "BOOL")]
    sync_output: Option<String>,

    #[arg(long = "s_depth", hide = true, default_value_t = 0)]
    s_depth: usize,

    /// Print version.
    #[arg(short = 'v', long = "version")]
    version: bool,
}

/// The parsed run-relevant arguments, kept on the engine between `init`
/// and `run`.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub tasks: Vec<String>,
    pub jobs: usize,
    pub dry_run: bool,
    pub show_tasks: bool,
    pub show_task_info: bool,
    pub directory: Option<PathBuf>,
    pub init_dir: PathBuf,
}

impl Default for RunArgs {
    fn default() -> RunArgs {
        RunArgs {
            tasks: Vec::new(),
            jobs: 1,
            dry_run: false,
            show_tasks: false,
            show_task_info: false,
            directory: None,
            init_dir: PathBuf::from("."),
        }
    }
}

pub struct InitOptions {
    /// Arguments to parse instead of the process command line.
    pub args: Option<Vec<String>>,
    /// Override the engine output stream.
    pub stdout: Option<Box<dyn Write + Send>>,
    pub show_task_headers: bool,
    /// Output-synchronization override; beats the command line and the
    /// environment.
    pub sync_output: Option<bool>,
    pub aggregate_exceptions: bool,
}

impl Default for InitOptions {
    fn default() -> InitOptions {
        InitOptions {
            args: None,
            stdout: None,
            show_task_headers: true,
            sync_output: None,
            aggregate_exceptions: false,
        }
    }
}

/// Parse the command line and construct the engine.
///
/// Prints to stderr and exits with `BAD_ARGUMENTS` (or the dedicated
/// define codes) when the arguments do not validate.
pub fn init() -> Forge {
    init_with(InitOptions::default())
}

pub fn init_with(options: InitOptions) -> Forge {
    let cli = match &options.args {
        Some(args) => {
            let mut argv: Vec<String> = vec![String::from("forge")];
            argv.extend(args.iter().cloned());
            Cli::parse_from(argv)
        }
        None => Cli::parse(),
    };

    if cli.version {
        println!("forge {}", env!("CARGO_PKG_VERSION"));
        process::exit(returncodes::SUCCESS);
    }

    let directory = match &cli.directory {
        Some(dir) => {
            if !dir.is_dir() {
                eprintln!(
                    "forge: error: Directory \"{}\" does not exist.",
                    dir.display()
                );
                process::exit(returncodes::BAD_ARGUMENTS);
            }
            Some(dunce::canonicalize(dir).unwrap_or_else(|_| dir.clone()))
        }
        None => None,
    };

    let sync_output = match resolve_sync_output(
        options.sync_output,
        cli.sync_output.as_deref(),
        env::var(SYNC_OUTPUT_INTERNAL_ENV).ok(),
        env::var(SYNC_OUTPUT_ENV).ok(),
    ) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("forge: error: {}", msg);
            process::exit(returncodes::BAD_ARGUMENTS);
        }
    };

    // Children spawned with subforge pick the effective value up from here
    env::set_var(SYNC_OUTPUT_INTERNAL_ENV, if sync_output { "1" } else { "0" });

    let mut defines = Defines::new();
    if cli.stdin_defines {
        let mut payload = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut payload) {
            eprintln!("Error reading defines from standard input: {}", e);
            process::exit(returncodes::STDIN_DEFINES_SYNTAX_ERROR);
        }
        match Defines::parse_stdin_payload(&payload) {
            Ok(parsed) => defines.merge(parsed),
            Err(e) => {
                eprintln!("{}", e);
                process::exit(returncodes::STDIN_DEFINES_SYNTAX_ERROR);
            }
        }
    }

    // Command line defines override stdin defines
    if let Err(e) = defines.add_define_args(cli.define.iter().map(|s| s.as_str())) {
        eprintln!("{}", e);
        process::exit(returncodes::BAD_DEFINE_VALUE);
    }

    let mut forge = Forge::new(ForgeConfig {
        stdout: options.stdout,
        sync_output,
        show_task_headers: options.show_task_headers,
        aggregate_exceptions: options.aggregate_exceptions,
        subforge_depth: cli.s_depth,
    });
    forge.defines_mut().merge(defines);

    let init_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if cli.s_depth > 0 {
        forge.print(format!("*** enter subforge[{}]:", cli.s_depth));
    }

    if let Some(dir) = &directory {
        let needs_change = env::current_dir()
            .map(|cwd| cwd != *dir)
            .unwrap_or(true);
        if needs_change {
            forge.print(format!(
                "forge[{}]: Entering Directory \"{}\"",
                cli.s_depth,
                dir.display()
            ));
            if let Err(e) = env::set_current_dir(dir) {
                eprintln!(
                    "forge: error: Could not change directory to \"{}\": {}",
                    dir.display(),
                    e
                );
                process::exit(returncodes::BAD_ARGUMENTS);
            }
        }
    }

    forge.run_args = Some(RunArgs {
        tasks: cli.tasks,
        jobs: cli.jobs.unwrap_or(1) as usize,
        dry_run: cli.dry_run,
        show_tasks: cli.show_tasks,
        show_task_info: cli.show_task_info,
        directory,
        init_dir,
    });

    forge
}

fn resolve_sync_output(
    init_arg: Option<bool>,
    cli_arg: Option<&str>,
    internal_env: Option<String>,
    user_env: Option<String>,
) -> Result<bool, String> {
    if let Some(value) = init_arg {
        return Ok(value);
    }
    if let Some(text) = cli_arg {
        return parse_bool_flag(text).ok_or_else(|| {
            format!(
                "Invalid --sync-output value \"{}\", expected 1, 0, true or false.",
                text
            )
        });
    }
    if let Some(text) = internal_env {
        return Ok(parse_bool_flag(&text).unwrap_or(true));
    }
    if let Some(text) = user_env {
        return Ok(parse_bool_flag(&text).unwrap_or(true));
    }
    Ok(true)
}

fn parse_bool_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Run the engine and exit the process with the resulting code.
///
/// `default_tasks` run when no tasks were named on the command line.
pub fn run(forge: Forge, default_tasks: &[&str]) -> ! {
    let code = run_with_exit_code(forge, default_tasks);
    process::exit(code);
}

/// Like `run`, but hands the exit code back instead of exiting.
pub fn run_with_exit_code(forge: Forge, default_tasks: &[&str]) -> i32 {
    let args = forge.run_args.clone().unwrap_or_default();
    let forge = Arc::new(forge);

    if forge.task_count() == 0 {
        eprintln!("*** No Tasks.  Stop.");
        return finish(&forge, &args, returncodes::NO_TASKS_DEFINED);
    }

    if args.show_tasks {
        list_tasks(&forge, default_tasks);
        return finish(&forge, &args, returncodes::SUCCESS);
    }

    if args.show_task_info {
        list_task_info(&forge, default_tasks);
        return finish(&forge, &args, returncodes::SUCCESS);
    }

    let run_tasks: Vec<TaskRef> = if !args.tasks.is_empty() {
        args.tasks.iter().map(|t| TaskRef::from(t.as_str())).collect()
    } else if !default_tasks.is_empty() {
        default_tasks.iter().map(|t| TaskRef::from(*t)).collect()
    } else {
        eprintln!("No tasks specified.");
        return finish(&forge, &args, returncodes::NO_TASKS_SPECIFIED);
    };

    // Quietly enforce the directory change before running any tasks, in
    // case the working directory moved after init
    if let Some(dir) = &args.directory {
        let needs_change = env::current_dir().map(|cwd| cwd != *dir).unwrap_or(true);
        if needs_change {
            let _ = env::set_current_dir(dir);
        }
    }

    let result = if args.dry_run {
        forge.dry_run(&run_tasks)
    } else {
        forge.run(&run_tasks, args.jobs.max(1))
    };

    let code = match result {
        Ok(()) => {
            if forge.run_count() == 0 {
                forge.print("Nothing to do, all tasks up to date.");
            }
            returncodes::SUCCESS
        }
        Err(err) => report_run_error(&err),
    };

    finish(&forge, &args, code)
}

/// Graceful exit outside of any task: print the directory and subforge
/// banners if needed, then exit with the given code.
pub fn terminate(forge: Forge, code: i32) -> ! {
    let args = forge.run_args.clone().unwrap_or_default();
    let forge = Arc::new(forge);
    process::exit(finish(&forge, &args, code));
}

fn report_run_error(err: &RunError) -> i32 {
    match err {
        RunError::Shared(inner) => report_run_error(inner),
        RunError::TaskExit { code, .. } => {
            if *code != returncodes::SUCCESS {
                eprintln!("\n{}\n", err);
            }
            *code
        }
        other => {
            eprintln!("{}", other);
            other.exit_code()
        }
    }
}

fn finish(forge: &Arc<Forge>, args: &RunArgs, code: i32) -> i32 {
    let depth = forge.subforge_depth();

    if let Ok(cwd) = env::current_dir() {
        if cwd != args.init_dir {
            forge.print(format!(
                "forge[{}]: Exiting Directory \"{}\"",
                depth,
                cwd.display()
            ));
            let _ = env::set_current_dir(&args.init_dir);
        }
    }

    if depth > 0 {
        forge.print(format!("*** exit subforge[{}]:", depth));
    }

    code
}

fn list_tasks(forge: &Arc<Forge>, default_tasks: &[&str]) {
    if !default_tasks.is_empty() {
        forge.print("# Default Tasks\n");
        for task in default_tasks {
            forge.print(*task);
        }
        forge.print("");
    }

    forge.print("# All Tasks\n");
    if forge.task_count() == 0 {
        forge.print("No tasks present.");
    } else {
        for record in forge.tasks() {
            forge.print(record.name.as_ref());
        }
    }
}

fn list_task_info(forge: &Arc<Forge>, default_tasks: &[&str]) {
    if !default_tasks.is_empty() {
        forge.print("# Default Tasks\n");
        for task in default_tasks {
            forge.print(*task);
        }
        forge.print("");
    }

    forge.print("# Documented Tasks\n");

    let documented: Vec<&Arc<TaskRecord>> =
        forge.tasks().filter(|t| t.doc().is_some()).collect();
    if documented.is_empty() {
        forge.print("No documented tasks present.");
        return;
    }

    let max_name_width = documented.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for record in documented {
        forge.print(format_task_info(
            max_name_width,
            record.name.as_ref(),
            record.doc().unwrap_or(""),
        ));
    }
}

fn format_task_info(max_name_width: usize, name: &str, doc: &str) -> String {
    let field_sep = ":  ";
    let lines = wrap_text(doc, 70);

    let mut out = String::new();
    if lines.len() > 1 {
        out.push('\n');
    }
    out.push_str(name);
    out.push_str(field_sep);
    if let Some((first, rest)) = lines.split_first() {
        out.push_str(&" ".repeat(max_name_width.saturating_sub(name.len())));
        out.push_str(first);
        for line in rest {
            out.push('\n');
            out.push_str(&" ".repeat(max_name_width + field_sep.len()));
            out.push_str(line);
        }
    }
    if lines.len() > 1 {
        out.push('\n');
    }

    out
}
