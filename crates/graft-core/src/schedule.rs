//! Transformer-level ordering: declared constraints to execution rounds.
//!
//! Same-round constraints (`must_run_before` / `must_run_after`) only order
//! transformers inside a round. Round constraints force the dependency into
//! a strictly earlier round. Rounds are built by peeling every transformer
//! whose dependencies are satisfied, repeatedly, until the round stops
//! growing.
use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::error::{ConfigError, PatchError};
use crate::transformer::Transformer;

/// Indices into the transformer list, grouped by round in execution order.
/// Members of a round are listed in peel order.
pub type Rounds = Vec<Vec<usize>>;

struct Graph {
    /// `same[a]` holds the transformers `a` waits for within a round.
    same: Vec<BTreeSet<usize>>,
    /// `round[a]` holds the transformers that must finish in an earlier round.
    round: Vec<BTreeSet<usize>>,
}

fn build_graph(transformers: &[Box<dyn Transformer>]) -> Result<Graph, ConfigError> {
    let mut ids: HashMap<&str, usize> = HashMap::with_capacity(transformers.len());
    for (i, t) in transformers.iter().enumerate() {
        if ids.insert(t.id(), i).is_some() {
            return Err(ConfigError::DuplicateTransformer {
                id: t.id().to_string(),
            });
        }
    }
    let lookup = |owner: &str, dep: &str| -> Result<usize, ConfigError> {
        ids.get(dep)
            .copied()
            .ok_or_else(|| ConfigError::UnknownDependency {
                transformer: owner.to_string(),
                dependency: dep.to_string(),
            })
    };

    let n = transformers.len();
    let mut graph = Graph {
        same: vec![BTreeSet::new(); n],
        round: vec![BTreeSet::new(); n],
    };
    for (i, t) in transformers.iter().enumerate() {
        for dep in t.must_run_after() {
            graph.same[i].insert(lookup(t.id(), &dep)?);
        }
        for dep in t.must_run_before() {
            graph.same[lookup(t.id(), &dep)?].insert(i);
        }
        for dep in t.must_run_round_after() {
            graph.round[i].insert(lookup(t.id(), &dep)?);
        }
        for dep in t.must_run_round_before() {
            graph.round[lookup(t.id(), &dep)?].insert(i);
        }
    }
    Ok(graph)
}

/// Validate the transformer set and compute its rounds.
///
/// Duplicate or unknown ids are configuration errors. A set that cannot be
/// fully placed (a cycle through either kind of constraint) fails with
/// [`PatchError::UnsatisfiableOrdering`].
pub fn plan_rounds(transformers: &[Box<dyn Transformer>]) -> Result<Rounds, PatchError> {
    let Graph {
        mut same,
        mut round,
    } = build_graph(transformers)?;
    let n = transformers.len();
    let mut placed = vec![false; n];
    let mut remaining = n;
    let mut rounds: Rounds = Vec::new();

    while remaining > 0 {
        let mut current: Vec<usize> = Vec::new();
        loop {
            let peel: Vec<usize> = (0..n)
                .filter(|&i| !placed[i] && same[i].is_empty() && round[i].is_empty())
                .collect();
            if peel.is_empty() {
                break;
            }
            for &i in &peel {
                placed[i] = true;
                remaining -= 1;
                for deps in same.iter_mut() {
                    deps.remove(&i);
                }
                trace!(transformer = transformers[i].id(), round = rounds.len(), "peeled");
            }
            current.extend(peel);
        }

        if current.is_empty() {
            let stuck: Vec<String> = (0..n)
                .filter(|&i| !placed[i])
                .map(|i| transformers[i].id().to_string())
                .collect();
            return Err(PatchError::UnsatisfiableOrdering { remaining: stuck });
        }

        for deps in round.iter_mut() {
            for i in &current {
                deps.remove(i);
            }
        }
        debug!(
            round = rounds.len(),
            transformers = ?current.iter().map(|&i| transformers[i].id()).collect::<Vec<_>>(),
            "closed round"
        );
        rounds.push(current);
    }
    Ok(rounds)
}
