// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::task::{InputSpec, OutputSpec};

#[derive(Debug)]
pub enum DetectError {
    InputNotFound { task: Arc<str>, path: String },
    MissingOutputs { task: Arc<str> },
    Io { task: Arc<str>, path: String, source: io::Error },
}

impl Error for DetectError {}
impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectError::InputNotFound { task, path } => write!(
                f,
                "Error: Could not find input file/directory \"{}\" used by task \"{}\".",
                path, task
            ),
            DetectError::MissingOutputs { task } => write!(
                f,
                "Error: Task \"{}\" defines inputs with no outputs, this is not allowed.",
                task
            ),
            DetectError::Io { task, path, source } => write!(
                f,
                "Error reading modification time of \"{}\" in task \"{}\": {}",
                path, task, source
            ),
        }
    }
}

/// The outdated input/output subsets computed for one task.
#[derive(Debug, Default)]
pub struct Outdated {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Resolve declared inputs and outputs into flat path lists.  Generators
/// run now, in declaration order; output generators receive the already
/// resolved input list.
pub fn resolve_io(
    inputs: &[InputSpec],
    outputs: &[OutputSpec],
) -> anyhow::Result<(Vec<String>, Vec<String>)> {
    let mut resolved_inputs: Vec<String> = Vec::new();
    for spec in inputs {
        match spec {
            InputSpec::Path(p) => resolved_inputs.push(p.clone()),
            InputSpec::Generator(generate) => resolved_inputs.extend(generate()?),
        }
    }

    let mut resolved_outputs: Vec<String> = Vec::new();
    for spec in outputs {
        match spec {
            OutputSpec::Path(p) => resolved_outputs.push(p.clone()),
            OutputSpec::Generator(generate) => {
                resolved_outputs.extend(generate(&resolved_inputs)?)
            }
        }
    }

    Ok((resolved_inputs, resolved_outputs))
}

/// Compute the outdated subsets of a task's resolved inputs and outputs.
///
/// Modification times compare strictly: an input triggers a rebuild iff its
/// mtime exceeds the compared output's mtime.  Equal mtimes do not trigger
/// a rebuild.
pub fn change_detect(
    task: &Arc<str>,
    inputs: &[String],
    outputs: &[String],
) -> Result<Outdated, DetectError> {
    if !inputs.is_empty() && outputs.is_empty() {
        return Err(DetectError::MissingOutputs { task: task.clone() });
    }

    let mut outdated = Outdated::default();

    if inputs.is_empty() && outputs.is_empty() {
        return Ok(outdated);
    }

    if outputs.len() > 1 {
        detect_multiple_outputs(task, inputs, outputs, &mut outdated)?;
    } else {
        detect_single_output(task, inputs, outputs, &mut outdated)?;
    }

    Ok(outdated)
}

fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

fn mtime(task: &Arc<str>, path: &str) -> Result<SystemTime, DetectError> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| DetectError::Io {
            task: task.clone(),
            path: String::from(path),
            source: e,
        })
}

fn detect_single_output(
    task: &Arc<str>,
    inputs: &[String],
    outputs: &[String],
    outdated: &mut Outdated,
) -> Result<(), DetectError> {
    let output = &outputs[0];

    if !exists(output) {
        for input in inputs {
            if !exists(input) {
                return Err(DetectError::InputNotFound {
                    task: task.clone(),
                    path: input.clone(),
                });
            }
        }
        outdated.inputs.extend(inputs.iter().cloned());
        outdated.outputs.push(output.clone());
        return Ok(());
    }

    let output_mtime = mtime(task, output)?;
    let mut output_outdated = false;
    for input in inputs {
        if !exists(input) {
            return Err(DetectError::InputNotFound {
                task: task.clone(),
                path: input.clone(),
            });
        }
        if mtime(task, input)? > output_mtime {
            outdated.inputs.push(input.clone());
            output_outdated = true;
        }
    }
    if output_outdated {
        outdated.outputs.push(output.clone());
    }

    Ok(())
}

fn detect_multiple_outputs(
    task: &Arc<str>,
    inputs: &[String],
    outputs: &[String],
    outdated: &mut Outdated,
) -> Result<(), DetectError> {
    if inputs.is_empty() {
        for output in outputs {
            if !exists(output) {
                outdated.outputs.push(output.clone());
            }
        }
        return Ok(());
    }

    if inputs.len() == outputs.len() {
        // Element-wise pairing
        for (input, output) in inputs.iter().zip(outputs.iter()) {
            if !exists(input) {
                return Err(DetectError::InputNotFound {
                    task: task.clone(),
                    path: input.clone(),
                });
            }
            if !exists(output) || mtime(task, output)? < mtime(task, input)? {
                outdated.inputs.push(input.clone());
                outdated.outputs.push(output.clone());
            }
        }
        return Ok(());
    }

    // Unequal lengths: cross product with dedup, declaration order preserved
    for input in inputs {
        if !exists(input) {
            return Err(DetectError::InputNotFound {
                task: task.clone(),
                path: input.clone(),
            });
        }
        let input_mtime = mtime(task, input)?;
        for output in outputs {
            if !exists(output) || mtime(task, output)? < input_mtime {
                if !outdated.inputs.contains(input) {
                    outdated.inputs.push(input.clone());
                }
                if !outdated.outputs.contains(output) {
                    outdated.outputs.push(output.clone());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::File;
    use std::time::Duration;

    use mktemp::Temp;

    fn task_name() -> Arc<str> {
        Arc::from("test_task")
    }

    fn touch_at(path: &Path, offset_secs: i64) {
        let file = File::create(path).unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);
        let mtime = if offset_secs >= 0 {
            base + Duration::from_secs(offset_secs as u64)
        } else {
            base - Duration::from_secs((-offset_secs) as u64)
        };
        file.set_modified(mtime).unwrap();
        file.sync_all().unwrap();
    }

    fn s(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_inputs_without_outputs_fails() {
        let err = change_detect(&task_name(), &[String::from("a.c")], &[]).unwrap_err();
        match err {
            DetectError::MissingOutputs { task } => assert_eq!(task.as_ref(), "test_task"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_io_produces_empty_sets() {
        let outdated = change_detect(&task_name(), &[], &[]).unwrap();
        assert!(outdated.inputs.is_empty());
        assert!(outdated.outputs.is_empty());
    }

    #[test]
    fn test_missing_input_fails() {
        let dir = Temp::new_dir().unwrap();
        let input = dir.join("missing.c");
        let output = dir.join("out.o");

        let err = change_detect(&task_name(), &[s(&input)], &[s(&output)]).unwrap_err();
        match err {
            DetectError::InputNotFound { path, .. } => assert_eq!(path, s(&input)),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_single_output_missing_marks_all() {
        let dir = Temp::new_dir().unwrap();
        let a = dir.join("a.c");
        let b = dir.join("b.c");
        let out = dir.join("out");
        touch_at(&a, 0);
        touch_at(&b, 0);

        let outdated = change_detect(&task_name(), &[s(&a), s(&b)], &[s(&out)]).unwrap();
        assert_eq!(outdated.inputs, vec![s(&a), s(&b)]);
        assert_eq!(outdated.outputs, vec![s(&out)]);
    }

    #[test]
    fn test_single_output_newer_input_marks_pair() {
        let dir = Temp::new_dir().unwrap();
        let stale = dir.join("stale.c");
        let fresh = dir.join("fresh.c");
        let out = dir.join("out");
        touch_at(&stale, 0);
        touch_at(&out, 10);
        touch_at(&fresh, 20);

        let outdated =
            change_detect(&task_name(), &[s(&stale), s(&fresh)], &[s(&out)]).unwrap();
        assert_eq!(outdated.inputs, vec![s(&fresh)]);
        assert_eq!(outdated.outputs, vec![s(&out)]);
    }

    #[test]
    fn test_up_to_date_single_output() {
        let dir = Temp::new_dir().unwrap();
        let input = dir.join("a.c");
        let out = dir.join("out");
        touch_at(&input, 0);
        touch_at(&out, 10);

        let outdated = change_detect(&task_name(), &[s(&input)], &[s(&out)]).unwrap();
        assert!(outdated.inputs.is_empty());
        assert!(outdated.outputs.is_empty());
    }

    #[test]
    fn test_equal_mtimes_do_not_trigger() {
        let dir = Temp::new_dir().unwrap();
        let input = dir.join("a.c");
        let out = dir.join("out");
        touch_at(&input, 5);
        touch_at(&out, 5);

        let outdated = change_detect(&task_name(), &[s(&input)], &[s(&out)]).unwrap();
        assert!(outdated.inputs.is_empty());
        assert!(outdated.outputs.is_empty());
    }

    #[test]
    fn test_outputs_only_marks_missing() {
        let dir = Temp::new_dir().unwrap();
        let present = dir.join("present");
        let absent = dir.join("absent");
        touch_at(&present, 0);

        let outdated =
            change_detect(&task_name(), &[], &[s(&present), s(&absent)]).unwrap();
        assert!(outdated.inputs.is_empty());
        assert_eq!(outdated.outputs, vec![s(&absent)]);
    }

    #[test]
    fn test_pairwise_detection() {
        let dir = Temp::new_dir().unwrap();
        let a = dir.join("a.c");
        let b = dir.join("b.c");
        let a_o = dir.join("a.o");
        let b_o = dir.join("b.o");
        touch_at(&a, 20);
        touch_at(&a_o, 10);
        touch_at(&b, 0);
        touch_at(&b_o, 10);

        let outdated = change_detect(
            &task_name(),
            &[s(&a), s(&b)],
            &[s(&a_o), s(&b_o)],
        )
        .unwrap();
        assert_eq!(outdated.inputs, vec![s(&a)]);
        assert_eq!(outdated.outputs, vec![s(&a_o)]);
        assert_eq!(outdated.inputs.len(), outdated.outputs.len());
    }

    #[test]
    fn test_cross_product_dedup() {
        let dir = Temp::new_dir().unwrap();
        let a = dir.join("a.c");
        let b = dir.join("b.c");
        let c = dir.join("c.c");
        let out1 = dir.join("out1");
        let out2 = dir.join("out2");
        touch_at(&a, 20);
        touch_at(&b, 20);
        touch_at(&c, 0);
        touch_at(&out1, 10);
        touch_at(&out2, 30);

        let outdated = change_detect(
            &task_name(),
            &[s(&a), s(&b), s(&c)],
            &[s(&out1), s(&out2)],
        )
        .unwrap();
        // a and b are newer than out1 only; c is older than everything
        assert_eq!(outdated.inputs, vec![s(&a), s(&b)]);
        assert_eq!(outdated.outputs, vec![s(&out1)]);
    }

    #[test]
    fn test_resolve_io_generators() {
        let dir = Temp::new_dir().unwrap();
        touch_at(&dir.join("x.c"), 0);
        touch_at(&dir.join("y.c"), 0);

        let input_pattern = format!("{}/*.c", dir.to_string_lossy());
        let inputs = vec![crate::task::glob(&input_pattern)];
        let outputs = vec![crate::task::pattern("{dir}/%.o")];

        let (i, o) = resolve_io(&inputs, &outputs).unwrap();
        assert_eq!(i.len(), 2);
        assert_eq!(o.len(), 2);
        assert!(o.iter().all(|p| p.ends_with(".o")));
    }

    #[test]
    fn test_resolve_io_literal_order() {
        let inputs = vec![InputSpec::from("b.c"), InputSpec::from("a.c")];
        let outputs = vec![OutputSpec::from("out")];
        let (i, o) = resolve_io(&inputs, &outputs).unwrap();
        assert_eq!(i, vec!["b.c", "a.c"]);
        assert_eq!(o, vec!["out"]);
    }
}
