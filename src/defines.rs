// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use crate::values::Value;

/// The engine's define store.  Written once before execution begins,
/// read-only thereafter.
#[derive(Debug, Default, Clone)]
pub struct Defines {
    map: HashMap<String, Value>,
}

#[derive(Debug)]
pub enum DefineError {
    BadValue { name: String, message: String },
    StdinSyntax(String),
}

impl Error for DefineError {}
impl fmt::Display for DefineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefineError::BadValue { name, message } => {
                write!(f, "Error parsing define value of \"{}\": {}", name, message)
            }
            DefineError::StdinSyntax(msg) => write!(
                f,
                "Syntax error parsing defines from standard input with --stdin-defines option: {}",
                msg
            ),
        }
    }
}

impl Defines {
    pub fn new() -> Defines {
        Defines::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.map.insert(name.into(), value);
    }

    /// Merge another define set in, overriding entries already present.
    pub fn merge(&mut self, other: Defines) {
        for (k, v) in other.map {
            self.map.insert(k, v);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Parse one `-D NAME[=EXPR]` argument.  A bare name defines boolean
    /// true.
    pub fn parse_define_arg(arg: &str) -> Result<(String, Value), DefineError> {
        match arg.split_once('=') {
            None => Ok((arg.trim().to_string(), Value::Bool(true))),
            Some((name, expr)) => {
                let name = name.trim().to_string();
                let value = Value::parse(expr).map_err(|e| DefineError::BadValue {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
                Ok((name, value))
            }
        }
    }

    pub fn add_define_args<'a, I>(&mut self, args: I) -> Result<(), DefineError>
    where
        I: Iterator<Item = &'a str>,
    {
        for arg in args {
            let (name, value) = Defines::parse_define_arg(arg)?;
            self.map.insert(name, value);
        }
        Ok(())
    }

    /// Parse the --stdin-defines payload: a single map literal with string
    /// keys.
    pub fn parse_stdin_payload(payload: &str) -> Result<Defines, DefineError> {
        let parsed =
            Value::parse(payload).map_err(|e| DefineError::StdinSyntax(e.to_string()))?;

        let entries = match parsed {
            Value::Map(entries) => entries,
            other => {
                return Err(DefineError::StdinSyntax(format!(
                    "expected a dictionary literal, got a value of type \"{}\"",
                    value_type_name(&other)
                )));
            }
        };

        let mut defines = Defines::new();
        for (key, value) in entries {
            match key {
                Value::Str(name) => {
                    defines.map.insert(name, value);
                }
                other => {
                    return Err(DefineError::StdinSyntax(format!(
                        "dictionary keys must be strings, got a key of type \"{}\"",
                        value_type_name(&other)
                    )));
                }
            }
        }

        Ok(defines)
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Str(_) => "string",
        Value::List(_) => "list",
        Value::Tuple(_) => "tuple",
        Value::Set(_) => "set",
        Value::Map(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define_arg_forms() {
        assert_eq!(
            Defines::parse_define_arg("FLAG").unwrap(),
            (String::from("FLAG"), Value::Bool(true))
        );
        assert_eq!(
            Defines::parse_define_arg("N=10").unwrap(),
            (String::from("N"), Value::Int(10))
        );
        assert_eq!(
            Defines::parse_define_arg("NAME=hello world").unwrap(),
            (String::from("NAME"), Value::Str(String::from("hello world")))
        );
        assert_eq!(
            Defines::parse_define_arg("L=[1, 's']").unwrap(),
            (
                String::from("L"),
                Value::List(vec![Value::Int(1), Value::Str(String::from("s"))])
            )
        );
    }

    #[test]
    fn test_parse_define_arg_bad_literal() {
        let err = Defines::parse_define_arg("L=[1, 2").unwrap_err();
        match err {
            DefineError::BadValue { name, .. } => assert_eq!(name, "L"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = Defines::new();
        base.set("A", Value::Int(1));
        base.set("B", Value::Int(2));

        let mut overlay = Defines::new();
        overlay.set("B", Value::Int(20));
        overlay.set("C", Value::Int(3));

        base.merge(overlay);
        assert_eq!(base.get("A"), Some(&Value::Int(1)));
        assert_eq!(base.get("B"), Some(&Value::Int(20)));
        assert_eq!(base.get("C"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_stdin_payload() {
        let defines =
            Defines::parse_stdin_payload("{'A': 1, 'B': [true, 'x'], 'C': {1: 2}}").unwrap();
        assert_eq!(defines.get("A"), Some(&Value::Int(1)));
        assert_eq!(
            defines.get("B"),
            Some(&Value::List(vec![
                Value::Bool(true),
                Value::Str(String::from("x"))
            ]))
        );
        assert_eq!(
            defines.get("C"),
            Some(&Value::Map(vec![(Value::Int(1), Value::Int(2))]))
        );
    }

    #[test]
    fn test_stdin_payload_rejects_non_map() {
        assert!(Defines::parse_stdin_payload("[1, 2]").is_err());
        assert!(Defines::parse_stdin_payload("{1: 2}").is_err());
        assert!(Defines::parse_stdin_payload("{'a': ").is_err());
    }
}
