//! Stable numeric exit codes for the forge command line driver.

/// 0. Success.
pub const SUCCESS: i32 = 0;

/// 1. Forgefile not found in directory, or specified forgefile does not exist.
pub const FORGEFILE_NOT_FOUND: i32 = 1;

/// 2. Bad combination of command line arguments.
pub const BAD_ARGUMENTS: i32 = 2;

/// 3. No tasks defined in the forgefile.
pub const NO_TASKS_DEFINED: i32 = 3;

/// 4. No tasks specified to run, and no default tasks exist.
pub const NO_TASKS_SPECIFIED: i32 = 4;

/// 5. A task's input file is missing.
pub const TASK_INPUT_NOT_FOUND: i32 = 5;

/// 6. A task declares input files but no output files.
pub const TASK_OUTPUT_MISSING: i32 = 6;

/// 7. An undefined task was referenced.
pub const UNDEFINED_TASK: i32 = 7;

/// 8. A cyclic dependency was detected.
pub const CYCLIC_DEPENDENCY: i32 = 8;

/// 9. An error occurred inside of a task.
pub const TASK_EXCEPTION: i32 = 9;

/// 10. A subprocess run by a task exited with a non-zero return code.
pub const TASK_SUBPROCESS_EXCEPTION: i32 = 10;

/// 11. A forgefile run with subforge exited with a non-zero return code.
pub const SUBFORGE_EXCEPTION: i32 = 11;

/// 12. A define value specified with -D/--define could not be parsed.
pub const BAD_DEFINE_VALUE: i32 = 12;

/// 13. The dictionary piped to --stdin-defines could not be parsed.
pub const STDIN_DEFINES_SYNTAX_ERROR: i32 = 13;
