// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

/// Name of a model or pipeline step, as it appears in configuration.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    MalformedConfig,
    DuplicateStepName,
    DisconnectedStep,
    UnreachableStep,
    CyclicGraph,
    MissingVirtualStep,
    TextFormat,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            MalformedConfig => "malformed_config",
            DuplicateStepName => "duplicate_step_name",
            DisconnectedStep => "disconnected_step",
            UnreachableStep => "unreachable_step",
            CyclicGraph => "cyclic_graph",
            MissingVirtualStep => "missing_virtual_step",
            TextFormat => "text_format",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading a persisted or exchanged document.
    Import,
    /// A configuration document that cannot be converted.
    Config,
    /// Dependency inference or layout over an ensemble's steps.
    Graph,
}

/// A structured failure.  For graph and config errors `details` holds the
/// offending step or variable name, so callers can point at it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Import => "ImportError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Graph => "GraphError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Import,
            code: ErrorCode::Generic,
            details: Some(err.to_string()),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! config_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Config, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Config, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! graph_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Graph, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Graph, ErrorCode::$code, None))
    }};
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Graph,
        ErrorCode::DisconnectedStep,
        Some("detector".to_string()),
    );
    assert_eq!("GraphError{disconnected_step: detector}", format!("{err}"));

    let err = Error::new(ErrorKind::Config, ErrorCode::MalformedConfig, None);
    assert_eq!("ConfigError{malformed_config}", format!("{err}"));
}

#[test]
fn test_error_macros() {
    let r: Result<()> = graph_err!(CyclicGraph, "a".to_string());
    let err = r.unwrap_err();
    assert_eq!(ErrorKind::Graph, err.kind);
    assert_eq!(ErrorCode::CyclicGraph, err.code);
    assert_eq!(Some("a".to_string()), err.get_details());

    let r: Result<()> = config_err!(MalformedConfig);
    assert_eq!(None, r.unwrap_err().details);
}

#[test]
fn test_from_serde_error() {
    let err: Error = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert_eq!(ErrorKind::Import, err.kind);
    assert_eq!(ErrorCode::Generic, err.code);
    assert!(err.details.is_some());
}
