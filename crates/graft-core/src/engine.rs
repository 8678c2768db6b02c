//! Multi-round driver: produce, order, apply, repeat.
use tracing::{debug, info};

use crate::apply::Applier;
use crate::error::PatchError;
use crate::node::Node;
use crate::order::{Schedule, derive_dependencies, sort_dependencies};
use crate::schedule::{Rounds, plan_rounds};
use crate::transformer::{Transformation, Transformer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub index: usize,
    pub transformers: Vec<String>,
    pub applied: usize,
    /// Transformations emitted by breaking soft dependencies.
    pub forced: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub rounds: Vec<RoundReport>,
}

impl RunReport {
    pub fn applied(&self) -> usize {
        self.rounds.iter().map(|r| r.applied).sum()
    }
}

/// A round's transformations together with their application order.
#[derive(Debug)]
pub struct PlannedRound {
    pub index: usize,
    pub transformations: Vec<Transformation>,
    pub schedule: Schedule,
}

/// Owns the registered transformers and their precomputed rounds.
pub struct Patcher {
    transformers: Vec<Box<dyn Transformer>>,
    rounds: Rounds,
}

impl Patcher {
    /// Validate ids and ordering declarations and compute the rounds.
    pub fn new(transformers: Vec<Box<dyn Transformer>>) -> Result<Self, PatchError> {
        let rounds = plan_rounds(&transformers)?;
        info!(
            transformers = transformers.len(),
            rounds = rounds.len(),
            "planned transformer rounds"
        );
        Ok(Self {
            transformers,
            rounds,
        })
    }

    /// Transformer ids per round, in execution order.
    pub fn round_ids(&self) -> Vec<Vec<&str>> {
        self.rounds
            .iter()
            .map(|round| round.iter().map(|&i| self.transformers[i].id()).collect())
            .collect()
    }

    /// Ask every transformer of round `index` for its transformations against
    /// `tree` and order them.
    pub fn plan_round(&self, index: usize, tree: &Node) -> Result<PlannedRound, PatchError> {
        let mut transformations = Vec::new();
        for &t in self.rounds.get(index).map(Vec::as_slice).unwrap_or_default() {
            let transformer = &self.transformers[t];
            let produced =
                transformer
                    .transformations(tree)
                    .map_err(|source| PatchError::Produce {
                        transformer: transformer.id().to_string(),
                        source,
                    })?;
            debug!(
                transformer = transformer.id(),
                count = produced.len(),
                "produced transformations"
            );
            for (n, mut tr) in produced.into_iter().enumerate() {
                tr.assign_id(transformer.id(), n);
                transformations.push(tr);
            }
        }

        let graph = derive_dependencies(&transformations);
        let schedule =
            sort_dependencies(&graph).map_err(|stuck| PatchError::UnsortableTransformations {
                round: index,
                remaining: stuck
                    .into_iter()
                    .map(|i| transformations[i].id().clone())
                    .collect(),
            })?;
        Ok(PlannedRound {
            index,
            transformations,
            schedule,
        })
    }

    /// Run every round against `tree`.
    ///
    /// Each round works on a structurally shared copy and is committed only
    /// when it completes, so on error `tree` holds the result of the last
    /// completed round.
    pub fn run(&self, tree: &mut Node) -> Result<RunReport, PatchError> {
        let mut report = RunReport::default();
        for index in 0..self.rounds.len() {
            let mut working = tree.shallow_copy();
            let planned = self.plan_round(index, &working)?;
            let forced = planned.schedule.forced.len();
            let applied = Applier::new(&mut working, planned.transformations)
                .apply_in_order(&planned.schedule.order)?;
            *tree = working;

            let transformers: Vec<String> = self.rounds[index]
                .iter()
                .map(|&i| self.transformers[i].id().to_string())
                .collect();
            info!(round = index, applied, forced, ?transformers, "round complete");
            report.rounds.push(RoundReport {
                index,
                transformers,
                applied,
                forced,
            });
        }
        Ok(report)
    }
}
