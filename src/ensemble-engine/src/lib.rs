// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub use ensemble_core::common;
pub use ensemble_core::datamodel;

pub mod config;
pub mod convert;
pub mod json;
pub mod layout;
pub mod pbtxt;
mod token;

pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::config::WriterConfig;
pub use self::convert::{
    ModelVersion, VersionInfo, prepare_for_save, prune_empty, to_exchange_format,
    to_original_format,
};
pub use self::json::ExchangeFormat;
pub use self::layout::{analyse_step_relationships, calculate_layout};
