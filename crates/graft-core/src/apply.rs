//! Sequential application of an ordered round.
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{PatchError, TreeError};
use crate::node::Node;
use crate::target::Shift;
use crate::transformer::Transformation;

/// Applies transformations to one tree, in the given order, keeping the
/// recorded paths of still-pending transformations valid as lists change
/// length.
pub struct Applier<'t> {
    tree: &'t mut Node,
    pending: Vec<Option<Transformation>>,
}

impl<'t> Applier<'t> {
    pub fn new(tree: &'t mut Node, transformations: Vec<Transformation>) -> Self {
        Self {
            tree,
            pending: transformations.into_iter().map(Some).collect(),
        }
    }

    /// Apply every pending transformation in `order` (indices into the
    /// transformations this applier was built with). Stops at the first
    /// failure; the tree keeps whatever was already written.
    pub fn apply_in_order(mut self, order: &[usize]) -> Result<usize, PatchError> {
        let mut applied = 0;
        for &i in order {
            let Some(transformation) = self.pending.get_mut(i).and_then(Option::take) else {
                continue;
            };
            if let Some(shift) = self.apply_one(transformation)? {
                self.absorb(&shift);
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn apply_one(&mut self, transformation: Transformation) -> Result<Option<Shift>, PatchError> {
        let (id, target, sources, apply) = transformation.into_parts();
        let current = target
            .resolve(self.tree)
            .map_err(|source| PatchError::Resolution {
                transformation: id.clone(),
                source,
            })?;
        let mut resolved = IndexMap::with_capacity(sources.len());
        for (name, source) in &sources {
            let value = source
                .resolve(self.tree)
                .map_err(|err| PatchError::Resolution {
                    transformation: id.clone(),
                    source: err,
                })?;
            resolved.insert(name.clone(), value);
        }

        let replacement = apply(current, resolved).map_err(|source| PatchError::Apply {
            transformation: id.clone(),
            source,
        })?;

        let shift = target
            .write(self.tree, replacement)
            .map_err(|source| match source {
                TreeError::ShapeMismatch { .. } => PatchError::Replacement {
                    transformation: id.clone(),
                    source,
                },
                other => PatchError::Resolution {
                    transformation: id.clone(),
                    source: other,
                },
            })?;
        debug!(transformation = %id, target = %target.path(), "applied");
        Ok(shift)
    }

    fn absorb(&mut self, shift: &Shift) {
        for pending in self.pending.iter_mut().flatten() {
            let mut moved = false;
            for target in pending.targets_mut() {
                moved |= target.absorb(shift);
            }
            if moved {
                debug!(
                    transformation = %pending.id(),
                    list = %shift.list,
                    delta = shift.delta,
                    "shifted pending paths"
                );
            }
        }
    }
}
