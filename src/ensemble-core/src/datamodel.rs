// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Runtime-facing ("original") configuration documents.
//!
//! These mirror what the serving runtime persists for each model: a
//! pipeline keeps its steps in a bare `step` list and its acceleration
//! hints in a bare `optimization` field.  Fields this crate does not own
//! are carried in `extra` and written back untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::Ident;

/// `platform` value marking a pipeline rather than a single model.
pub const ENSEMBLE_PLATFORM: &str = "ensemble";

/// Virtual step standing for a pipeline's external inputs.
pub const FEED: &str = "feed";
/// Virtual step standing for a pipeline's external outputs.
pub const FETCH: &str = "fetch";

/// Original-format configurations keyed by model name.
pub type OriginalFormat = BTreeMap<Ident, ModelConfig>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigKind {
    Ensemble,
    Model,
    /// Neither an ensemble nor a model with a backend.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorConfig {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TensorConfig {
    pub fn new(name: &str) -> Self {
        TensorConfig {
            name: name.to_owned(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub model_name: Ident,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub input_map: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub output_map: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    pub fn new(model_name: &str) -> Self {
        Step {
            model_name: model_name.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, placeholder: &str, var: &str) -> Self {
        self.input_map
            .insert(placeholder.to_owned(), Value::String(var.to_owned()));
        self
    }

    pub fn with_output(mut self, placeholder: &str, var: &str) -> Self {
        self.output_map
            .insert(placeholder.to_owned(), Value::String(var.to_owned()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<Ident>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub input: Vec<TensorConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub output: Vec<TensorConfig>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub optimization: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub step: Option<Vec<Step>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelConfig {
    pub fn kind(&self) -> ConfigKind {
        if self.is_ensemble() {
            ConfigKind::Ensemble
        } else if self.backend.is_some() {
            ConfigKind::Model
        } else {
            ConfigKind::Unknown
        }
    }

    pub fn is_ensemble(&self) -> bool {
        self.platform.as_deref() == Some(ENSEMBLE_PLATFORM)
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        self.step.as_deref().unwrap_or(&[])
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> + Clone {
        self.input.iter().map(|t| t.name.as_str())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> + Clone {
        self.output.iter().map(|t| t.name.as_str())
    }
}
