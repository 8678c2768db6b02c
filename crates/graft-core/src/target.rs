//! Targets: where a transformation reads or writes.
//!
//! Slice bounds are stored doubled. Even position `2k` is the gap before
//! element `k`; odd position `2k + 1` is element `k` itself. A slice always
//! has even bounds, and `start == end` is a pure insertion point.
use std::ops::Range;

use crate::error::TreeError;
use crate::node::Node;
use crate::path::{Path, Step};

/// Exactly one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTarget {
    path: Path,
}

impl NodeTarget {
    pub fn new(path: Path) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A contiguous, possibly empty, run of siblings inside one list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceTarget {
    list: Path,
    start: usize,
    end: usize,
}

impl SliceTarget {
    /// Elements `range` of the list at `list`.
    pub fn elements(list: Path, range: Range<usize>) -> Self {
        let (start, end) = if range.start <= range.end {
            (range.start, range.end)
        } else {
            (range.end, range.start)
        };
        Self {
            list,
            start: start * 2,
            end: end * 2,
        }
    }

    /// Insertion point before element `index`.
    pub fn insertion(list: Path, index: usize) -> Self {
        Self::elements(list, index..index)
    }

    /// From doubled bounds. `None` unless both are even and `start <= end`.
    pub fn from_doubled(list: Path, start: usize, end: usize) -> Option<Self> {
        if start % 2 != 0 || end % 2 != 0 || start > end {
            return None;
        }
        Some(Self { list, start, end })
    }

    pub fn list(&self) -> &Path {
        &self.list
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }

    /// Element range addressed, undoubled.
    pub fn range(&self) -> Range<usize> {
        self.start / 2..self.end / 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(NodeTarget),
    Slice(SliceTarget),
}

/// Index displacement caused by a slice write whose length changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    /// The list that was spliced.
    pub list: Path,
    /// Doubled start of the replaced slice.
    pub start: usize,
    /// Doubled end of the replaced slice; positions at or past it move.
    pub from: usize,
    /// Element count delta (`replacement.len() - replaced.len()`).
    pub delta: isize,
}

impl Target {
    pub fn node(path: Path) -> Self {
        Target::Node(NodeTarget::new(path))
    }

    pub fn slice(list: Path, range: Range<usize>) -> Self {
        Target::Slice(SliceTarget::elements(list, range))
    }

    pub fn insertion(list: Path, index: usize) -> Self {
        Target::Slice(SliceTarget::insertion(list, index))
    }

    /// Node path, or the list path of a slice.
    pub fn path(&self) -> &Path {
        match self {
            Target::Node(t) => &t.path,
            Target::Slice(t) => &t.list,
        }
    }

    /// Current value: the addressed node, or a fresh list of the sliced elements.
    pub fn resolve(&self, tree: &Node) -> Result<Node, TreeError> {
        match self {
            Target::Node(t) => tree.get(&t.path).cloned(),
            Target::Slice(t) => {
                let list = tree.get(&t.list)?;
                let items = list.as_list().ok_or_else(|| TreeError::ShapeMismatch {
                    path: t.list.clone(),
                    expected: "list",
                    found: list.kind_name(),
                })?;
                let range = t.range();
                let slice = items.get(range.clone()).ok_or(TreeError::InvalidSlice {
                    path: t.list.clone(),
                    start: range.start,
                    end: range.end,
                    len: items.len(),
                })?;
                Ok(Node::list(slice.to_vec()))
            }
        }
    }

    /// Write `replacement` into `tree`. Returns the shift pending paths must
    /// absorb when a slice changed length.
    pub fn write(&self, tree: &mut Node, replacement: Node) -> Result<Option<Shift>, TreeError> {
        match self {
            Target::Node(t) => {
                let expected = tree.get(&t.path)?.kind_name();
                let found = replacement.shape()?;
                if expected != found {
                    return Err(TreeError::ShapeMismatch {
                        path: t.path.clone(),
                        expected,
                        found,
                    });
                }
                tree.set(&t.path, replacement)?;
                Ok(None)
            }
            Target::Slice(t) => {
                let replacement = replacement.resolved()?;
                let items = replacement
                    .as_list()
                    .ok_or_else(|| TreeError::ShapeMismatch {
                        path: t.list.clone(),
                        expected: "list",
                        found: replacement.kind_name(),
                    })?
                    .to_vec();
                let inserted = items.len();
                let removed = tree.splice(&t.list, t.range(), items)?.len();
                let delta = inserted as isize - removed as isize;
                if delta == 0 {
                    return Ok(None);
                }
                Ok(Some(Shift {
                    list: t.list.clone(),
                    start: t.start,
                    from: t.end,
                    delta,
                }))
            }
        }
    }

    /// Move this target so it keeps addressing the same content after `shift`.
    ///
    /// Returns true when anything changed.
    pub fn absorb(&mut self, shift: &Shift) -> bool {
        let mut moved = false;
        let path = match self {
            Target::Node(t) => &mut t.path,
            Target::Slice(t) => {
                if t.list == shift.list {
                    // A slice ending at the edited gap keeps its end unless it
                    // encloses a non-empty edit or is itself an insertion there.
                    let move_start = t.start >= shift.from;
                    let move_end = t.end > shift.from
                        || (t.end == shift.from && (move_start || shift.start < shift.from));
                    if move_start {
                        t.start = t.start.saturating_add_signed(shift.delta * 2);
                    }
                    if move_end {
                        t.end = t.end.saturating_add_signed(shift.delta * 2);
                    }
                    return move_start || move_end;
                }
                &mut t.list
            }
        };
        let depth = shift.list.len();
        if path.len() > depth && path.starts_with(&shift.list) {
            if let Some(Step::Index(i)) = path.step_mut(depth) {
                if *i * 2 >= shift.from {
                    *i = i.saturating_add_signed(shift.delta);
                    moved = true;
                }
            }
        }
        moved
    }
}

impl From<NodeTarget> for Target {
    fn from(t: NodeTarget) -> Self {
        Target::Node(t)
    }
}

impl From<SliceTarget> for Target {
    fn from(t: SliceTarget) -> Self {
        Target::Slice(t)
    }
}
