//! Transformation-level ordering.
//!
//! Dependencies between the transformations of one round are derived from
//! where their targets and sources sit in the tree:
//!
//! * a write enclosing another write runs first; overlapping writes at the
//!   same level run in production order;
//! * a read at or below a write runs after that write (hard);
//! * a read of a container that encloses a write prefers to run after the
//!   write (soft). Soft edges are broken when nothing else can make progress.
//!
//! Overlaps are found by walking all regions depth-first over shared path
//! prefixes. Inside a list, slice regions are swept over their doubled
//! breakpoints while tracking which slices enclose the sweep position.
use std::collections::{BTreeMap, BTreeSet};

use tracing::{trace, warn};

use crate::path::{Path, Step};
use crate::target::Target;
use crate::transformer::Transformation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Write,
    Read,
}

#[derive(Debug)]
enum Region<'a> {
    Node(&'a Path),
    Slice {
        list: &'a Path,
        start: usize,
        end: usize,
    },
}

impl Region<'_> {
    fn path(&self) -> &Path {
        match self {
            Region::Node(p) => p,
            Region::Slice { list, .. } => list,
        }
    }
}

#[derive(Debug)]
struct Entry<'a> {
    owner: usize,
    role: Role,
    region: Region<'a>,
}

/// Derived dependency sets. `hard[y]` holds every transformation that must
/// be applied before `y`; `soft[y]` those preferably applied before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    pub hard: Vec<BTreeSet<usize>>,
    pub soft: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    fn with_len(n: usize) -> Self {
        Self {
            hard: vec![BTreeSet::new(); n],
            soft: vec![BTreeSet::new(); n],
        }
    }

    fn hard(&mut self, before: usize, after: usize) {
        if before != after && self.hard[after].insert(before) {
            trace!(before, after, "hard dependency");
        }
    }

    fn soft(&mut self, before: usize, after: usize) {
        if before != after && self.soft[after].insert(before) {
            trace!(before, after, "soft dependency");
        }
    }
}

/// Linear application order for one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Indices into the round's transformations, in application order.
    pub order: Vec<usize>,
    /// Transformations emitted by breaking their remaining soft dependencies.
    pub forced: Vec<usize>,
}

/// Derive dependencies from target/source overlap.
pub fn derive_dependencies(transformations: &[Transformation]) -> DependencyGraph {
    let mut entries = Vec::new();
    for (owner, t) in transformations.iter().enumerate() {
        entries.push(entry(owner, Role::Write, t.target()));
        for source in t.sources().values() {
            entries.push(entry(owner, Role::Read, source));
        }
    }
    let mut wiring = Wiring {
        entries: &entries,
        graph: DependencyGraph::with_len(transformations.len()),
    };
    let all: Vec<usize> = (0..entries.len()).collect();
    wiring.descend(&all, 0);
    wiring.graph
}

fn entry(owner: usize, role: Role, target: &Target) -> Entry<'_> {
    let region = match target {
        Target::Node(t) => Region::Node(t.path()),
        Target::Slice(t) => Region::Slice {
            list: t.list(),
            start: t.start(),
            end: t.end(),
        },
    };
    Entry {
        owner,
        role,
        region,
    }
}

#[derive(Default)]
struct Breakpoint {
    starts: Vec<usize>,
    ends: Vec<usize>,
    empty: Vec<usize>,
    child: Vec<usize>,
}

struct Wiring<'e, 'a> {
    entries: &'e [Entry<'a>],
    graph: DependencyGraph,
}

impl Wiring<'_, '_> {
    /// `group` shares its first `depth` steps.
    fn descend(&mut self, group: &[usize], depth: usize) {
        let mut here = Vec::new();
        let mut slices = Vec::new();
        let mut keyed: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut indexed: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let entries = self.entries;
        for &e in group {
            let region = &entries[e].region;
            let path = region.path();
            match (region, path.step(depth)) {
                (Region::Node(_), None) => here.push(e),
                (Region::Slice { .. }, None) => slices.push(e),
                (_, Some(Step::Key(k))) => keyed.entry(k.as_str()).or_default().push(e),
                (_, Some(Step::Index(i))) => indexed.entry(*i).or_default().push(e),
            }
        }

        // Regions addressing this node overlap each other and enclose the rest.
        for (n, &h) in here.iter().enumerate() {
            for &other in &here[n + 1..] {
                self.relate(h, other, false);
            }
            for &other in group {
                if !here.contains(&other) {
                    self.relate(h, other, true);
                }
            }
        }

        for sub in keyed.values() {
            self.descend(sub, depth + 1);
        }
        if slices.is_empty() {
            for sub in indexed.values() {
                self.descend(sub, depth + 1);
            }
            return;
        }
        self.sweep(&slices, indexed, depth);
    }

    fn sweep(&mut self, slices: &[usize], indexed: BTreeMap<usize, Vec<usize>>, depth: usize) {
        let mut points: BTreeMap<usize, Breakpoint> = BTreeMap::new();
        for &s in slices {
            let (start, end) = self.bounds(s);
            if start == end {
                points.entry(start).or_default().empty.push(s);
            } else {
                points.entry(start).or_default().starts.push(s);
                points.entry(end).or_default().ends.push(s);
            }
        }
        for (i, sub) in indexed {
            points.entry(2 * i + 1).or_default().child = sub;
        }

        let mut enclosing: Vec<usize> = Vec::new();
        for (pos, bp) in points {
            enclosing.retain(|&s| self.bounds(s).1 > pos);

            for &open in &enclosing {
                for &t in bp.starts.iter().chain(&bp.ends).chain(&bp.empty) {
                    self.relate(open, t, false);
                }
            }
            for (n, &a) in bp.starts.iter().enumerate() {
                for &b in &bp.starts[n + 1..] {
                    self.relate(a, b, false);
                }
            }
            for (n, &a) in bp.empty.iter().enumerate() {
                for &b in &bp.empty[n + 1..] {
                    self.relate(a, b, false);
                }
            }

            if !bp.child.is_empty() {
                for &open in &enclosing {
                    for &c in &bp.child {
                        self.relate(open, c, true);
                    }
                }
                self.descend(&bp.child, depth + 1);
            }
            enclosing.extend(bp.starts);
        }
    }

    fn bounds(&self, e: usize) -> (usize, usize) {
        match self.entries[e].region {
            Region::Slice { start, end, .. } => (start, end),
            Region::Node(_) => (0, 0),
        }
    }

    /// Wire two overlapping regions. With `nested`, `outer` strictly encloses
    /// `inner`; otherwise they overlap at the same level.
    fn relate(&mut self, outer: usize, inner: usize, nested: bool) {
        let entries = self.entries;
        let (a, b) = (&entries[outer], &entries[inner]);
        if a.owner == b.owner {
            return;
        }
        match (a.role, b.role) {
            (Role::Read, Role::Read) => {}
            (Role::Write, Role::Write) => {
                if nested {
                    self.graph.hard(a.owner, b.owner);
                } else {
                    let (first, second) = (a.owner.min(b.owner), a.owner.max(b.owner));
                    self.graph.hard(first, second);
                }
            }
            (Role::Write, Role::Read) => self.graph.hard(a.owner, b.owner),
            (Role::Read, Role::Write) => {
                if nested {
                    self.graph.soft(b.owner, a.owner);
                } else {
                    self.graph.hard(b.owner, a.owner);
                }
            }
        }
    }
}

/// Order transformations so every hard dependency is applied first.
///
/// Each pass emits all transformations with no remaining dependency. When a
/// pass finds hard-ready transformations that all still have soft
/// dependencies, the one with the fewest is emitted anyway. Returns the
/// unsortable remainder when no transformation is hard-ready.
pub fn sort_dependencies(graph: &DependencyGraph) -> Result<Schedule, Vec<usize>> {
    let n = graph.hard.len();
    let mut hard = graph.hard.clone();
    let mut soft = graph.soft.clone();
    let mut remaining: BTreeSet<usize> = (0..n).collect();
    let mut schedule = Schedule::default();

    while !remaining.is_empty() {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&t| hard[t].is_empty())
            .collect();
        if ready.is_empty() {
            return Err(remaining.into_iter().collect());
        }
        let mut emit: Vec<usize> = ready
            .iter()
            .copied()
            .filter(|&t| soft[t].is_empty())
            .collect();
        if emit.is_empty() {
            let Some(&pick) = ready.iter().min_by_key(|&&t| (soft[t].len(), t)) else {
                return Err(remaining.into_iter().collect());
            };
            warn!(
                transformation = pick,
                broken = soft[pick].len(),
                "breaking soft dependencies to make progress"
            );
            schedule.forced.push(pick);
            emit.push(pick);
        }
        for t in emit {
            remaining.remove(&t);
            schedule.order.push(t);
            for &r in &remaining {
                hard[r].remove(&t);
                soft[r].remove(&t);
            }
        }
    }
    Ok(schedule)
}
