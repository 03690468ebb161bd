// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Producer/consumer inference over an ensemble's variables.
//!
//! Steps only name the pipeline variables they read and write; the edges
//! between steps are reconstructed here by pairing every producer of a
//! variable with every consumer of it.

use std::collections::HashMap;

use serde_json::{Map, Value};

use ensemble_core::common::{Ident, Result};
use ensemble_core::datamodel::{FEED, FETCH};
use ensemble_core::{config_err, graph_err};

use crate::json::Step;

/// Everything known about one pipeline variable once the table is frozen.
/// Producers and consumers are kept in first-seen order, without repeats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub from_models: Vec<Ident>,
    pub to_models: Vec<Ident>,
}

/// Immutable variable table. Use `VariableTableBuilder` to construct.
#[derive(Debug)]
pub struct VariableTable {
    vars: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableTable {
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&i| &self.vars[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Builds the table for a step list that already contains the virtual
    /// `feed` and `fetch` steps.  Declared pipeline inputs are produced by
    /// `feed` and declared outputs consumed by `fetch`.
    pub fn from_steps<'a>(
        steps: &[Step],
        inputs: impl IntoIterator<Item = &'a str> + Clone,
        outputs: impl IntoIterator<Item = &'a str> + Clone,
    ) -> Result<Self> {
        let mut builder = VariableTableBuilder::new();
        for step in steps {
            if step.is_virtual() {
                match step.model_name.as_str() {
                    FEED => {
                        for var in inputs.clone() {
                            builder.add_producer(var, FEED);
                        }
                    }
                    FETCH => {
                        for var in outputs.clone() {
                            builder.add_consumer(var, FETCH);
                        }
                    }
                    _ => {}
                }
                continue;
            }

            for var in mapped_vars(&step.input_map, &step.model_name)? {
                builder.add_consumer(var, &step.model_name);
            }
            for var in mapped_vars(&step.output_map, &step.model_name)? {
                builder.add_producer(var, &step.model_name);
            }
        }
        Ok(builder.build())
    }
}

/// Pipeline variable names referenced by an `inputMap` or `outputMap`.
fn mapped_vars<'a>(map: &'a Map<String, Value>, model_name: &str) -> Result<Vec<&'a str>> {
    let mut vars = Vec::with_capacity(map.len());
    for (placeholder, var) in map.iter() {
        match var {
            Value::String(var) if !var.is_empty() => vars.push(var.as_str()),
            _ => {
                return config_err!(
                    MalformedConfig,
                    format!("{model_name}: bad variable for '{placeholder}'")
                );
            }
        }
    }
    Ok(vars)
}

/// Mutable accumulator for a `VariableTable`.
#[derive(Default)]
pub struct VariableTableBuilder {
    vars: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, name: &str) -> &mut Variable {
        let next = self.vars.len();
        let i = *self.index.entry(name.to_owned()).or_insert(next);
        if i == next {
            self.vars.push(Variable {
                name: name.to_owned(),
                from_models: vec![],
                to_models: vec![],
            });
        }
        &mut self.vars[i]
    }

    pub fn add_producer(&mut self, var: &str, model: &str) -> &mut Self {
        push_unique(&mut self.entry(var).from_models, model);
        self
    }

    pub fn add_consumer(&mut self, var: &str, model: &str) -> &mut Self {
        push_unique(&mut self.entry(var).to_models, model);
        self
    }

    pub fn build(self) -> VariableTable {
        VariableTable {
            vars: self.vars,
            index: self.index,
        }
    }
}

fn push_unique(list: &mut Vec<Ident>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_owned());
    }
}

/// Maps step names to their position in the step list, rejecting repeats.
pub(crate) fn index_steps(steps: &[Step]) -> Result<HashMap<&str, usize>> {
    let mut index = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if index.insert(step.model_name.as_str(), i).is_some() {
            return graph_err!(DuplicateStepName, step.model_name.clone());
        }
    }
    Ok(index)
}

/// Writes the edges recorded in `table` onto the steps.
///
/// Every producer/consumer pair of a variable is one edge: the variable is
/// appended to the producer's `outputVars` and the consumer's `inputVars`
/// once per edge, while `inputModels`/`outputModels` only record each
/// neighbor once.
pub fn materialize_edges(steps: &mut [Step], table: &VariableTable) -> Result<()> {
    let index: HashMap<String, usize> = index_steps(steps)?
        .into_iter()
        .map(|(name, i)| (name.to_owned(), i))
        .collect();

    for var in table.iter() {
        for from in var.from_models.iter() {
            let Some(&p) = index.get(from) else {
                continue;
            };
            for to in var.to_models.iter() {
                let Some(&c) = index.get(to) else {
                    continue;
                };

                steps[p].output_vars.push(var.name.clone());
                push_unique(&mut steps[p].output_models, to);

                steps[c].input_vars.push(var.name.clone());
                push_unique(&mut steps[c].input_models, from);
            }
        }
    }

    Ok(())
}

/// Fills `inputModels`, `outputModels`, `inputVars` and `outputVars` on
/// every step, then positions the steps with
/// [`calculate_layout`](super::calculate_layout).
///
/// `steps` must already contain the virtual `feed` and `fetch` steps.
pub fn analyse_step_relationships<'a>(
    steps: &mut [Step],
    inputs: impl IntoIterator<Item = &'a str> + Clone,
    outputs: impl IntoIterator<Item = &'a str> + Clone,
) -> Result<()> {
    index_steps(steps)?;

    for step in steps.iter_mut() {
        step.reset_derived();
    }

    let table = VariableTable::from_steps(steps, inputs, outputs)?;
    log::debug!(
        "analysing {} steps connected by {} variables",
        steps.len(),
        table.len()
    );

    materialize_edges(steps, &table)?;

    if let Some(step) = steps
        .iter()
        .find(|s| s.model_name != FEED && s.input_models.is_empty())
    {
        return graph_err!(DisconnectedStep, step.model_name.clone());
    }

    super::calculate_layout(steps)
}
