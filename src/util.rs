use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum ArgsError {
    Empty,
    Parse(String),
}

impl Error for ArgsError {}
impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::Empty => write!(
                f,
                "Not enough arguments provided.  Must provide at least one argument, i.e. the command."
            ),
            ArgsError::Parse(s) => write!(f, "Error splitting command line: {}", s),
        }
    }
}

/// Conversion of the flexible command argument shapes accepted by
/// `TaskContext::call` and `subforge` into a flat argv.  A single string is
/// split with shell quoting rules; slices and vectors are stringified
/// element-wise.
pub trait IntoArgs {
    fn into_args(self) -> Result<Vec<String>, ArgsError>;
}

impl IntoArgs for &str {
    fn into_args(self) -> Result<Vec<String>, ArgsError> {
        shlex::split(self).ok_or_else(|| ArgsError::Parse(String::from(self)))
    }
}

impl IntoArgs for String {
    fn into_args(self) -> Result<Vec<String>, ArgsError> {
        self.as_str().into_args()
    }
}

impl IntoArgs for Vec<String> {
    fn into_args(self) -> Result<Vec<String>, ArgsError> {
        Ok(self)
    }
}

impl IntoArgs for Vec<&str> {
    fn into_args(self) -> Result<Vec<String>, ArgsError> {
        Ok(self.into_iter().map(String::from).collect())
    }
}

impl IntoArgs for &[String] {
    fn into_args(self) -> Result<Vec<String>, ArgsError> {
        Ok(self.to_vec())
    }
}

impl IntoArgs for &[&str] {
    fn into_args(self) -> Result<Vec<String>, ArgsError> {
        Ok(self.iter().map(|s| String::from(*s)).collect())
    }
}

impl<const N: usize> IntoArgs for [&str; N] {
    fn into_args(self) -> Result<Vec<String>, ArgsError> {
        Ok(self.iter().map(|s| String::from(*s)).collect())
    }
}

pub fn require_command(args: Vec<String>) -> Result<Vec<String>, ArgsError> {
    if args.is_empty() {
        return Err(ArgsError::Empty);
    }
    Ok(args)
}

/// Greedy word wrap used by the --show-task-info listing.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
}
