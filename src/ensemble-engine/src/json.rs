// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Exchange-format documents consumed and produced by the configuration UI.
//!
//! Compared to the runtime documents in [`ensemble_core::datamodel`], an
//! exchange document splits models from pipelines, wraps acceleration hints
//! under `optimization.executionAccelerators`, lists on-disk versions, and
//! keeps a pipeline's steps under `ensembleScheduling.step` together with the
//! virtual `feed`/`fetch` steps and the derived graph and layout fields.
//!
//! # Example
//! ```no_run
//! use ensemble_engine::json;
//!
//! let json_str = r#"{"models": [], "ensembles": []}"#;
//! let exchange: json::ExchangeFormat = json_str.parse()?;
//! let original = ensemble_engine::to_original_format(&exchange)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ensemble_core::common::{Error, ErrorCode, ErrorKind, Ident};
use ensemble_core::datamodel::{self, TensorConfig};

fn is_empty_vec<T>(val: &[T]) -> bool {
    val.is_empty()
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    let opt = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Normal,
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub model_name: Ident,
    #[serde(default)]
    pub model_type: ModelType,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub input_map: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub output_map: Map<String, Value>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub input_models: Vec<Ident>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub output_models: Vec<Ident>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub input_vars: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub output_vars: Vec<String>,
    #[serde(rename = "pos_x", skip_serializing_if = "Option::is_none", default)]
    pub pos_x: Option<u32>,
    #[serde(rename = "pos_y", skip_serializing_if = "Option::is_none", default)]
    pub pos_y: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Step {
    /// A synthetic boundary step (`feed` or `fetch`).
    pub fn new_virtual(model_name: &str) -> Self {
        Step {
            model_name: model_name.to_owned(),
            model_type: ModelType::Virtual,
            ..Default::default()
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.model_type == ModelType::Virtual
    }

    /// Clears everything the graph builder and layout derive.
    pub fn reset_derived(&mut self) {
        self.input_models.clear();
        self.output_models.clear();
        self.input_vars.clear();
        self.output_vars.clear();
        self.pos_x = None;
        self.pos_y = None;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleScheduling {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub step: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimization {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub execution_accelerators: Option<Value>,
}

/// A node in the version tree shown by the UI: a version label whose
/// children are the resource files found in that version's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionNode {
    pub title: String,
    pub key: String,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub children: Vec<VersionNode>,
}

impl VersionNode {
    pub fn leaf(label: &str) -> Self {
        VersionNode {
            title: label.to_owned(),
            key: label.to_owned(),
            children: vec![],
        }
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
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub input: Vec<TensorConfig>,
    #[serde(skip_serializing_if = "is_empty_vec", default)]
    pub output: Vec<TensorConfig>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub optimization: Option<Optimization>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ensemble_scheduling: Option<EnsembleScheduling>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub versions: Option<Vec<VersionNode>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelConfig {
    pub fn is_ensemble(&self) -> bool {
        self.platform.as_deref() == Some(datamodel::ENSEMBLE_PLATFORM)
    }

    pub fn steps(&self) -> &[Step] {
        self.ensemble_scheduling
            .as_ref()
            .map(|s| s.step.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_step(&self, model_name: &str) -> Option<&Step> {
        self.steps().iter().find(|s| s.model_name == model_name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExchangeFormat {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub models: Vec<ModelConfig>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub ensembles: Vec<ModelConfig>,
    /// Names of entries that were neither ensembles nor backed models and so
    /// were left out of both lists.  Never serialized.
    #[serde(skip)]
    pub skipped: Vec<Ident>,
}

impl ExchangeFormat {
    /// All entries, ensembles first, in the order the UI sent them.
    pub fn entries(&self) -> impl Iterator<Item = &ModelConfig> {
        self.ensembles.iter().chain(self.models.iter())
    }

    /// Parse an exchange document from a reader
    pub fn from_reader(reader: impl std::io::Read) -> ensemble_core::Result<Self> {
        serde_json::from_reader(reader).map_err(|err| {
            Error::new(
                ErrorKind::Import,
                ErrorCode::Generic,
                Some(format!("Failed to parse exchange document: {}", err)),
            )
        })
    }
}

impl std::str::FromStr for ExchangeFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(|err| {
            Error::new(
                ErrorKind::Import,
                ErrorCode::Generic,
                Some(format!("Failed to parse exchange document: {}", err)),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_derived_fields_default() {
        let step: Step = serde_json::from_value(json!({
            "modelName": "det",
            "inputMap": {"x": "image"},
            "inputModels": null,
        }))
        .unwrap();
        assert_eq!(ModelType::Normal, step.model_type);
        assert!(step.input_models.is_empty());
        assert!(step.output_vars.is_empty());
        assert_eq!(None, step.pos_x);
    }

    #[test]
    fn test_step_serializes_layout_keys() {
        let mut step = Step::new_virtual("feed");
        step.pos_x = Some(0);
        step.pos_y = Some(0);
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(json!("virtual"), value["modelType"]);
        assert_eq!(json!(0), value["pos_x"]);
        assert_eq!(json!(0), value["pos_y"]);
        assert_eq!(json!([]), value["inputModels"]);
        assert!(value.get("inputMap").is_none());
    }

    #[test]
    fn test_version_leaf_has_no_children_key() {
        let node = VersionNode {
            title: "1".to_string(),
            key: "1".to_string(),
            children: vec![VersionNode::leaf("model.onnx")],
        };
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json!({"title": "1", "key": "1", "children": [{"title": "model.onnx", "key": "model.onnx"}]}),
            value
        );
    }

    #[test]
    fn test_exchange_from_str() {
        let exchange: ExchangeFormat = r#"{"models": [{"name": "a", "backend": "python"}]}"#
            .parse()
            .unwrap();
        assert_eq!(1, exchange.models.len());
        assert!(exchange.ensembles.is_empty());

        let err = "{".parse::<ExchangeFormat>().unwrap_err();
        assert_eq!(ErrorKind::Import, err.kind);
    }
}
