// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

// The forge launcher: find a forgefile executable (or take -f/--file
// paths), forward the remaining arguments to it, and propagate its exit
// code.  All other command line handling lives in the forgefile itself.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use forge::returncodes;

fn exit_code_from(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn main() -> ExitCode {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut forwarded: Vec<String> = Vec::new();

    // Strip out the -f/--file switches, forward everything else
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-f" || arg == "--file" {
            match args.next() {
                Some(path) => files.push(PathBuf::from(path)),
                None => {
                    eprintln!("forge: error: {} expects a forgefile path.", arg);
                    return exit_code_from(returncodes::BAD_ARGUMENTS);
                }
            }
        } else {
            forwarded.push(arg);
        }
    }

    // Without -f, run the implicit forgefile and propagate its exit code
    if files.is_empty() {
        let default = Path::new("forgefile");
        if !default.is_file() {
            eprintln!("No forgefile was found in this directory.");
            return exit_code_from(returncodes::FORGEFILE_NOT_FOUND);
        }
        return match run_forgefile(default, &forwarded) {
            Ok(code) => exit_code_from(code),
            Err(e) => {
                eprintln!("forge: error executing \"{}\": {}", default.display(), e);
                exit_code_from(returncodes::FORGEFILE_NOT_FOUND)
            }
        };
    }

    for file in files.iter() {
        if !file.is_file() {
            eprintln!("forgefile: \"{}\" does not exist.", file.display());
            return exit_code_from(returncodes::FORGEFILE_NOT_FOUND);
        }
    }

    // With -f, every listed forgefile runs in order even after a failure;
    // any failure flattens to exit 1
    let mut any_failed = false;
    for file in files {
        match run_forgefile(&file, &forwarded) {
            Ok(code) => {
                if code != returncodes::SUCCESS {
                    any_failed = true;
                }
            }
            Err(e) => {
                eprintln!("forge: error executing \"{}\": {}", file.display(), e);
                any_failed = true;
            }
        }
    }

    if any_failed {
        exit_code_from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_forgefile(file: &Path, forwarded: &[String]) -> std::io::Result<i32> {
    // A bare file name needs the explicit current-directory prefix to
    // spawn without a PATH lookup
    let spawn_path = if file.components().count() > 1 {
        file.to_path_buf()
    } else {
        Path::new(".").join(file)
    };

    let status = Command::new(&spawn_path).args(forwarded).status()?;
    Ok(status.code().unwrap_or(1))
}
