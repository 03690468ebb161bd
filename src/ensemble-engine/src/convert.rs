// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Conversion between runtime ("original") documents and the exchange
//! documents the configuration UI works with.

use std::collections::HashMap;

use serde_json::{Map, Value};

use ensemble_core::common::{Ident, Result};
use ensemble_core::datamodel::{self, ConfigKind, FEED, FETCH, OriginalFormat};
use ensemble_core::config_err;

use crate::config::WriterConfig;
use crate::json::{self, EnsembleScheduling, ExchangeFormat, Optimization, VersionNode};
use crate::layout::analyse_step_relationships;
use crate::pbtxt;

/// One version directory of a model and the files found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVersion {
    pub label: String,
    pub files: Vec<String>,
}

impl ModelVersion {
    pub fn new(label: &str, files: &[&str]) -> Self {
        ModelVersion {
            label: label.to_owned(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Version directories per repository entry, keyed like [`OriginalFormat`]
/// (the model's directory name), as found by the repository scanner.
pub type VersionInfo = HashMap<Ident, Vec<ModelVersion>>;

impl From<datamodel::Step> for json::Step {
    fn from(step: datamodel::Step) -> Self {
        json::Step {
            model_name: step.model_name,
            input_map: step.input_map,
            output_map: step.output_map,
            extra: step.extra,
            ..Default::default()
        }
    }
}

impl From<json::Step> for datamodel::Step {
    fn from(step: json::Step) -> Self {
        datamodel::Step {
            model_name: step.model_name,
            input_map: step.input_map,
            output_map: step.output_map,
            extra: step.extra,
        }
    }
}

fn version_tree(versions: &[ModelVersion]) -> Vec<VersionNode> {
    versions
        .iter()
        .map(|v| VersionNode {
            title: v.label.clone(),
            key: v.label.clone(),
            children: v.files.iter().map(|f| VersionNode::leaf(f)).collect(),
        })
        .collect()
}

/// Converts runtime configurations into the exchange document.
///
/// Pipelines get their `feed` and `fetch` steps added and every step
/// annotated with its dependencies and grid position.  Entries that are
/// neither pipelines nor backed models are listed in
/// [`ExchangeFormat::skipped`].
pub fn to_exchange_format(original: &OriginalFormat, versions: &VersionInfo) -> Result<ExchangeFormat> {
    let mut exchange = ExchangeFormat::default();

    for (key, config) in original.iter() {
        let name = config.name.clone().unwrap_or_else(|| key.clone());

        let kind = config.kind();
        if kind == ConfigKind::Unknown {
            log::warn!("skipping '{name}': neither an ensemble nor a model with a backend");
            exchange.skipped.push(name);
            continue;
        }

        let mut entry = json::ModelConfig {
            name: Some(name.clone()),
            platform: config.platform.clone(),
            backend: config.backend.clone(),
            input: config.input.clone(),
            output: config.output.clone(),
            optimization: config.optimization.clone().map(|accelerators| Optimization {
                execution_accelerators: Some(accelerators),
            }),
            ensemble_scheduling: None,
            versions: versions
                .get(key)
                .or_else(|| versions.get(&name))
                .map(|v| version_tree(v)),
            extra: config.extra.clone(),
        };

        if kind == ConfigKind::Model {
            log::debug!("converted model '{name}'");
            exchange.models.push(entry);
            continue;
        }

        if let Some(steps) = config.step.as_ref() {
            let mut steps: Vec<json::Step> = steps.iter().cloned().map(json::Step::from).collect();
            steps.push(json::Step::new_virtual(FEED));
            steps.push(json::Step::new_virtual(FETCH));
            analyse_step_relationships(&mut steps, config.input_names(), config.output_names())?;
            entry.ensemble_scheduling = Some(EnsembleScheduling { step: steps });
        }
        log::debug!("converted ensemble '{name}'");
        exchange.ensembles.push(entry);
    }

    Ok(exchange)
}

/// Converts an exchange document back into runtime configurations, keyed
/// by name.  Derived step fields and the virtual steps are dropped.
pub fn to_original_format(exchange: &ExchangeFormat) -> Result<OriginalFormat> {
    let mut original = OriginalFormat::new();

    for entry in exchange.entries() {
        let Some(name) = entry.name.clone() else {
            return config_err!(MalformedConfig, "configuration without a name".to_owned());
        };
        if original.contains_key(&name) {
            return config_err!(MalformedConfig, name);
        }

        let mut extra = entry.extra.clone();
        let step = match entry.ensemble_scheduling.as_ref() {
            Some(scheduling) if entry.is_ensemble() => Some(
                scheduling
                    .step
                    .iter()
                    .filter(|s| s.model_name != FEED && s.model_name != FETCH)
                    .cloned()
                    .map(datamodel::Step::from)
                    .collect(),
            ),
            // only pipelines have steps; anything else is carried untouched
            Some(scheduling) => {
                extra.insert(
                    "ensembleScheduling".to_owned(),
                    serde_json::to_value(scheduling)?,
                );
                None
            }
            None => None,
        };

        let config = datamodel::ModelConfig {
            name: Some(name.clone()),
            platform: entry.platform.clone(),
            backend: entry.backend.clone(),
            input: entry.input.clone(),
            output: entry.output.clone(),
            optimization: entry
                .optimization
                .as_ref()
                .and_then(|o| o.execution_accelerators.clone()),
            step,
            extra,
        };
        original.insert(name, config);
    }

    Ok(original)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Drops top-level fields with empty values.  Nested messages are left
/// alone: inside them a zero is usually meaningful.
pub fn prune_empty(config: &mut Map<String, Value>) {
    config.retain(|_, value| !is_empty_value(value));
}

/// Renders one configuration from an exchange document as the text the
/// runtime expects on disk.
pub fn prepare_for_save(
    exchange: &ExchangeFormat,
    model_name: &str,
    writer_config: &WriterConfig,
) -> Result<String> {
    let mut original = to_original_format(exchange)?;
    let Some(config) = original.remove(model_name) else {
        return config_err!(MalformedConfig, model_name.to_owned());
    };

    let mut value = pbtxt::model_config_to_value(&config)?;
    if writer_config.prune_empty {
        if let Value::Object(fields) = &mut value {
            prune_empty(fields);
        }
    }
    log::debug!("writing configuration for '{model_name}'");

    pbtxt::write(&value, writer_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_core::common::ErrorCode;
    use ensemble_core::datamodel::{ModelConfig, Step, TensorConfig};
    use serde_json::json;

    fn model(name: &str) -> ModelConfig {
        ModelConfig {
            name: Some(name.to_owned()),
            backend: Some("fastdeploy".to_owned()),
            ..Default::default()
        }
    }

    fn pipeline() -> ModelConfig {
        ModelConfig {
            name: Some("pipe".to_owned()),
            platform: Some("ensemble".to_owned()),
            input: vec![TensorConfig::new("image")],
            output: vec![TensorConfig::new("boxes")],
            step: Some(vec![
                Step::new("pre")
                    .with_input("IN", "image")
                    .with_output("OUT", "tensor"),
                Step::new("det")
                    .with_input("x", "tensor")
                    .with_output("y", "boxes"),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn test_optimization_wrapping() {
        let mut config = model("det");
        config.optimization = Some(json!({"accel": "gpu"}));
        let original = OriginalFormat::from([("det".to_owned(), config)]);

        let exchange = to_exchange_format(&original, &VersionInfo::new()).unwrap();
        let value = serde_json::to_value(&exchange.models[0]).unwrap();
        assert_eq!(
            json!({"executionAccelerators": {"accel": "gpu"}}),
            value["optimization"]
        );

        let back = to_original_format(&exchange).unwrap();
        assert_eq!(Some(json!({"accel": "gpu"})), back["det"].optimization);
        assert_eq!(original, back);
    }

    #[test]
    fn test_routing_and_skipping() {
        let unknown = ModelConfig {
            name: Some("mystery".to_owned()),
            ..Default::default()
        };
        let original = OriginalFormat::from([
            ("det".to_owned(), model("det")),
            ("pipe".to_owned(), pipeline()),
            ("mystery".to_owned(), unknown),
        ]);

        let exchange = to_exchange_format(&original, &VersionInfo::new()).unwrap();
        assert_eq!(1, exchange.models.len());
        assert_eq!(1, exchange.ensembles.len());
        assert_eq!(vec!["mystery".to_string()], exchange.skipped);
    }

    #[test]
    fn test_missing_name_uses_key() {
        let mut config = model("det");
        config.name = None;
        let original = OriginalFormat::from([("from_dir".to_owned(), config)]);

        let exchange = to_exchange_format(&original, &VersionInfo::new()).unwrap();
        assert_eq!(Some("from_dir"), exchange.models[0].name.as_deref());
    }

    #[test]
    fn test_versions_attached() {
        let original = OriginalFormat::from([("det".to_owned(), model("det"))]);
        let versions = VersionInfo::from([(
            "det".to_owned(),
            vec![
                ModelVersion::new("1", &["model.pdmodel", "model.pdiparams"]),
                ModelVersion::new("2", &[]),
            ],
        )]);

        let exchange = to_exchange_format(&original, &versions).unwrap();
        let value = serde_json::to_value(&exchange.models[0]).unwrap();
        assert_eq!(
            json!([
                {"title": "1", "key": "1", "children": [
                    {"title": "model.pdmodel", "key": "model.pdmodel"},
                    {"title": "model.pdiparams", "key": "model.pdiparams"},
                ]},
                {"title": "2", "key": "2"},
            ]),
            value["versions"]
        );

        // versions are display-only and never written back
        let back = to_original_format(&exchange).unwrap();
        assert!(back["det"].extra.get("versions").is_none());
    }

    #[test]
    fn test_versions_follow_repository_key() {
        let mut config = model("detector");
        config.name = Some("det_v2".to_owned());
        let original = OriginalFormat::from([("detector".to_owned(), config)]);
        let versions = VersionInfo::from([(
            "detector".to_owned(),
            vec![ModelVersion::new("1", &["model.onnx"])],
        )]);

        let exchange = to_exchange_format(&original, &versions).unwrap();
        let entry = &exchange.models[0];
        assert_eq!(Some("det_v2"), entry.name.as_deref());
        assert_eq!(1, entry.versions.as_ref().unwrap().len());

        // the name is still accepted when the key has no entry
        let versions = VersionInfo::from([(
            "det_v2".to_owned(),
            vec![ModelVersion::new("3", &[])],
        )]);
        let exchange = to_exchange_format(&original, &versions).unwrap();
        assert_eq!("3", exchange.models[0].versions.as_ref().unwrap()[0].key);
    }

    #[test]
    fn test_scheduling_on_plain_model_is_carried() {
        let exchange: ExchangeFormat = serde_json::from_value(json!({
            "models": [{
                "name": "det",
                "backend": "python",
                "ensembleScheduling": {"step": [{"modelName": "feed"}]},
            }],
        }))
        .unwrap();

        let original = to_original_format(&exchange).unwrap();
        let det = &original["det"];
        assert!(det.step.is_none());
        assert_eq!(
            json!("feed"),
            det.extra["ensembleScheduling"]["step"][0]["modelName"]
        );
    }

    #[test]
    fn test_pipeline_saved_under_scheduling() {
        let original = OriginalFormat::from([("pipe".to_owned(), pipeline())]);
        let exchange = to_exchange_format(&original, &VersionInfo::new()).unwrap();

        let text = prepare_for_save(&exchange, "pipe", &WriterConfig::default()).unwrap();
        assert!(text.contains("ensemble_scheduling {\n  step {\n    model_name: \"pre\""));
        assert!(!text.contains("\nstep {"));
        assert!(!text.contains("feed"));

        let saved = pbtxt::parse_model_config(&text).unwrap();
        assert_eq!(original["pipe"], saved);
    }

    #[test]
    fn test_pipeline_steps_annotated() {
        let original = OriginalFormat::from([("pipe".to_owned(), pipeline())]);
        let exchange = to_exchange_format(&original, &VersionInfo::new()).unwrap();

        let pipe = &exchange.ensembles[0];
        let names: Vec<&str> = pipe.steps().iter().map(|s| s.model_name.as_str()).collect();
        assert_eq!(vec!["pre", "det", "feed", "fetch"], names);

        let det = pipe.get_step("det").unwrap();
        assert_eq!(vec!["pre".to_string()], det.input_models);
        assert_eq!(vec!["fetch".to_string()], det.output_models);
        assert_eq!(vec!["tensor".to_string()], det.input_vars);
        assert_eq!((Some(0), Some(2)), (det.pos_x, det.pos_y));

        let fetch = pipe.get_step("fetch").unwrap();
        assert!(fetch.is_virtual());
        assert_eq!(Some(3), fetch.pos_y);
    }

    #[test]
    fn test_pipeline_without_steps_passes_through() {
        let mut config = pipeline();
        config.step = None;
        let original = OriginalFormat::from([("pipe".to_owned(), config)]);

        let exchange = to_exchange_format(&original, &VersionInfo::new()).unwrap();
        assert!(exchange.ensembles[0].ensemble_scheduling.is_none());
        assert_eq!(original, to_original_format(&exchange).unwrap());
    }

    #[test]
    fn test_graph_errors_propagate() {
        let mut config = pipeline();
        config.step = Some(vec![Step::new("lonely").with_input("x", "nothing")]);
        let original = OriginalFormat::from([("pipe".to_owned(), config)]);

        let err = to_exchange_format(&original, &VersionInfo::new()).unwrap_err();
        assert_eq!(ErrorCode::DisconnectedStep, err.code);
        assert_eq!(Some("lonely".to_string()), err.details);
    }

    #[test]
    fn test_derived_fields_stripped() {
        let exchange: ExchangeFormat = serde_json::from_value(json!({
            "ensembles": [{
                "name": "pipe",
                "platform": "ensemble",
                "ensembleScheduling": {"step": [
                    {"modelName": "pre", "modelType": "normal", "modelVersion": -1,
                     "inputMap": {"IN": "image"}, "inputModels": ["feed"],
                     "inputVars": ["image"], "pos_x": 0, "pos_y": 1},
                    {"modelName": "feed", "modelType": "virtual"},
                    {"modelName": "fetch", "modelType": "virtual"},
                ]},
            }],
        }))
        .unwrap();

        let original = to_original_format(&exchange).unwrap();
        let value = serde_json::to_value(&original["pipe"]).unwrap();
        assert_eq!(
            json!({
                "name": "pipe",
                "platform": "ensemble",
                "step": [{"modelName": "pre", "inputMap": {"IN": "image"}, "modelVersion": -1}],
            }),
            value
        );
    }

    #[test]
    fn test_to_original_errors() {
        let exchange: ExchangeFormat =
            serde_json::from_value(json!({"models": [{"backend": "python"}]})).unwrap();
        let err = to_original_format(&exchange).unwrap_err();
        assert_eq!(ErrorCode::MalformedConfig, err.code);

        let exchange: ExchangeFormat = serde_json::from_value(json!({
            "models": [{"name": "a", "backend": "python"}],
            "ensembles": [{"name": "a", "platform": "ensemble"}],
        }))
        .unwrap();
        let err = to_original_format(&exchange).unwrap_err();
        assert_eq!(Some("a".to_string()), err.details);
    }

    #[test]
    fn test_prune_empty() {
        let mut fields = json!({
            "name": "det",
            "maxBatchSize": 0,
            "platform": "",
            "dynamicBatching": {},
            "input": [],
            "sequenceBatching": null,
            "instanceGroup": [{"count": 0}],
            "ready": false,
            "ratio": 0.5,
        });
        prune_empty(fields.as_object_mut().unwrap());
        assert_eq!(
            json!({"name": "det", "instanceGroup": [{"count": 0}], "ratio": 0.5}),
            fields
        );
    }

    #[test]
    fn test_prepare_for_save() {
        let exchange: ExchangeFormat = serde_json::from_value(json!({
            "models": [{
                "name": "det",
                "backend": "fastdeploy",
                "maxBatchSize": 0,
                "input": [{"name": "x", "dataType": "TYPE_FP32", "dims": [3]}],
                "optimization": {"executionAccelerators": {"cpuExecutionAccelerator": [{"name": "ort"}]}},
                "versions": [{"title": "1", "key": "1"}],
            }],
        }))
        .unwrap();

        let text = prepare_for_save(&exchange, "det", &WriterConfig::default()).unwrap();
        let expected = r#"name: "det"
backend: "fastdeploy"
input {
  name: "x"
  data_type: TYPE_FP32
  dims: [3]
}
optimization {
  cpu_execution_accelerator {
    name: "ort"
  }
}
"#;
        assert_eq!(expected, text);

        let keep_empty = WriterConfig {
            prune_empty: false,
            ..Default::default()
        };
        let text = prepare_for_save(&exchange, "det", &keep_empty).unwrap();
        assert!(text.ends_with("max_batch_size: 0\n"));

        let err = prepare_for_save(&exchange, "missing", &WriterConfig::default()).unwrap_err();
        assert_eq!(ErrorCode::MalformedConfig, err.code);
        assert_eq!(Some("missing".to_string()), err.details);
    }
}
