// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Grid layout for an ensemble's step graph.
//!
//! A step's row (`pos_y`) is its longest-path distance from `feed`; its
//! column (`pos_x`) is its index among the steps of that row, in the order
//! the depth-first walk from `fetch` first reached them.

pub mod graph;

use std::collections::HashMap;

use ensemble_core::common::Result;
use ensemble_core::datamodel::{FEED, FETCH};
use ensemble_core::graph_err;

use crate::json::Step;

pub use self::graph::{VariableTable, VariableTableBuilder, analyse_step_relationships};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done(u32),
}

struct RankWalker<'a> {
    steps: &'a [Step],
    index: HashMap<&'a str, usize>,
    marks: HashMap<usize, Mark>,
    /// Step indices in the order the walk first entered them.
    visit_order: Vec<usize>,
}

impl<'a> RankWalker<'a> {
    fn new(steps: &'a [Step]) -> Result<Self> {
        Ok(RankWalker {
            steps,
            index: graph::index_steps(steps)?,
            marks: HashMap::new(),
            visit_order: Vec::with_capacity(steps.len()),
        })
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        match self.index.get(name) {
            Some(&i) => Ok(i),
            None => graph_err!(MissingVirtualStep, name.to_owned()),
        }
    }

    fn rank(&mut self, i: usize) -> Result<u32> {
        match self.marks.get(&i) {
            Some(Mark::Done(rank)) => return Ok(*rank),
            Some(Mark::Visiting) => {
                return graph_err!(CyclicGraph, self.steps[i].model_name.clone());
            }
            None => {}
        }

        self.visit_order.push(i);
        let steps = self.steps;
        let step = &steps[i];

        if step.model_name == FEED {
            self.marks.insert(i, Mark::Done(0));
            return Ok(0);
        }
        if step.input_models.is_empty() {
            return graph_err!(DisconnectedStep, step.model_name.clone());
        }

        self.marks.insert(i, Mark::Visiting);
        let mut max_input = 0;
        for input in step.input_models.iter() {
            let Some(&p) = self.index.get(input.as_str()) else {
                // an edge to a step that isn't in this pipeline
                return graph_err!(DisconnectedStep, step.model_name.clone());
            };
            max_input = max_input.max(self.rank(p)?);
        }

        let rank = max_input + 1;
        self.marks.insert(i, Mark::Done(rank));
        Ok(rank)
    }
}

/// Assigns `pos_y` (rank) and `pos_x` (column) to every step.
///
/// `inputModels` must already be populated, see
/// [`analyse_step_relationships`].  Fails with `CyclicGraph` when the
/// steps depend on each other in a loop, `DisconnectedStep` when a step
/// other than `feed` has no inputs, and `UnreachableStep` when nothing
/// downstream of a step leads to `fetch`.
pub fn calculate_layout(steps: &mut [Step]) -> Result<()> {
    let placements = {
        let mut walker = RankWalker::new(steps)?;
        walker.lookup(FEED)?;
        let fetch = walker.lookup(FETCH)?;
        walker.rank(fetch)?;

        if let Some(step) = steps
            .iter()
            .enumerate()
            .find(|(i, _)| !walker.marks.contains_key(i))
            .map(|(_, s)| s)
        {
            return graph_err!(UnreachableStep, step.model_name.clone());
        }

        let mut ranked: Vec<(u32, usize, usize)> = walker
            .visit_order
            .iter()
            .enumerate()
            .map(|(order, &i)| match walker.marks[&i] {
                Mark::Done(rank) => (rank, order, i),
                Mark::Visiting => unreachable!("walk finished with a step still in progress"),
            })
            .collect();
        ranked.sort_unstable();

        assign_columns(&ranked)
    };

    for (i, pos_x, pos_y) in placements {
        steps[i].pos_x = Some(pos_x);
        steps[i].pos_y = Some(pos_y);
    }

    Ok(())
}

/// Left-packs each rank: columns restart at zero whenever the rank changes.
fn assign_columns(ranked: &[(u32, usize, usize)]) -> Vec<(usize, u32, u32)> {
    let mut placements = Vec::with_capacity(ranked.len());
    let mut last_rank = None;
    let mut column = 0;
    for &(rank, _, i) in ranked {
        if last_rank != Some(rank) {
            column = 0;
            last_rank = Some(rank);
        }
        placements.push((i, column, rank));
        column += 1;
    }
    placements
}
