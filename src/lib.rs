// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

pub mod concurrent_io;
pub mod context;
pub mod defines;
pub mod detect;
pub mod executor;
pub mod fileutil;
pub mod forge;
pub mod graph;
pub mod process;
pub mod program;
pub mod returncodes;
pub mod subforge;
pub mod task;
pub mod util;
pub mod values;

pub use context::{MultitaskContext, TaskContext};
pub use fileutil::FileHelper;
pub use forge::{Forge, ForgeConfig, RunError};
pub use process::CallOptions;
pub use program::{init, init_with, run, run_with_exit_code, terminate, InitOptions};
pub use task::{glob, pattern, InputSpec, OutputSpec, TaskError, TaskHandle, TaskRef, TaskSpec};
pub use values::Value;
