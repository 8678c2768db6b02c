//! Transformer definitions and the transformations they produce.
use std::fmt;

use indexmap::IndexMap;

use crate::error::BoxError;
use crate::node::Node;
use crate::target::Target;

/// Computes a replacement from the target's current value and the resolved sources.
pub type ApplyFn = Box<dyn FnOnce(Node, IndexMap<String, Node>) -> Result<Node, BoxError>>;

/// A named, stateless producer of transformations.
///
/// Ordering declarations name other transformers by id. `must_run_before`
/// and `must_run_after` order transformers within a round; the `round`
/// variants force a strict round boundary.
pub trait Transformer {
    fn id(&self) -> &str;

    fn must_run_before(&self) -> Vec<String> {
        Vec::new()
    }

    fn must_run_after(&self) -> Vec<String> {
        Vec::new()
    }

    fn must_run_round_before(&self) -> Vec<String> {
        Vec::new()
    }

    fn must_run_round_after(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produce this round's transformations against `tree` as it currently stands.
    fn transformations(&self, tree: &Node) -> Result<Vec<Transformation>, BoxError>;
}

/// `transformer#index`, where index is the position in the transformer's output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransformationId {
    pub transformer: String,
    pub index: usize,
}

impl fmt::Display for TransformationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.transformer, self.index)
    }
}

/// One unit of work: a target to write, named sources to read, and the
/// capability computing the replacement. Applied at most once.
pub struct Transformation {
    id: TransformationId,
    target: Target,
    sources: IndexMap<String, Target>,
    apply: ApplyFn,
}

impl Transformation {
    pub fn new<F>(target: impl Into<Target>, apply: F) -> Self
    where
        F: FnOnce(Node, IndexMap<String, Node>) -> Result<Node, BoxError> + 'static,
    {
        Self {
            id: TransformationId {
                transformer: String::new(),
                index: 0,
            },
            target: target.into(),
            sources: IndexMap::new(),
            apply: Box::new(apply),
        }
    }

    /// Replace the target with a fixed value.
    pub fn replace_with(target: impl Into<Target>, replacement: Node) -> Self {
        Self::new(target, move |_, _| Ok(replacement))
    }

    pub fn with_source(mut self, name: impl Into<String>, source: impl Into<Target>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }

    pub fn id(&self) -> &TransformationId {
        &self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn sources(&self) -> &IndexMap<String, Target> {
        &self.sources
    }

    pub(crate) fn assign_id(&mut self, transformer: &str, index: usize) {
        self.id = TransformationId {
            transformer: transformer.to_string(),
            index,
        };
    }

    /// Every target this transformation holds, write target first.
    pub(crate) fn targets_mut(&mut self) -> impl Iterator<Item = &mut Target> {
        std::iter::once(&mut self.target).chain(self.sources.values_mut())
    }

    pub(crate) fn into_parts(self) -> (TransformationId, Target, IndexMap<String, Target>, ApplyFn) {
        (self.id, self.target, self.sources, self.apply)
    }
}

impl fmt::Debug for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformation")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

type ProduceFn = Box<dyn Fn(&Node) -> Result<Vec<Transformation>, BoxError>>;

/// Transformer assembled from a closure and builder-style ordering declarations.
pub struct FnTransformer {
    id: String,
    before: Vec<String>,
    after: Vec<String>,
    round_before: Vec<String>,
    round_after: Vec<String>,
    produce: ProduceFn,
}

impl FnTransformer {
    pub fn new<F>(id: impl Into<String>, produce: F) -> Self
    where
        F: Fn(&Node) -> Result<Vec<Transformation>, BoxError> + 'static,
    {
        Self {
            id: id.into(),
            before: Vec::new(),
            after: Vec::new(),
            round_before: Vec::new(),
            round_after: Vec::new(),
            produce: Box::new(produce),
        }
    }

    pub fn run_before(mut self, id: impl Into<String>) -> Self {
        self.before.push(id.into());
        self
    }

    pub fn run_after(mut self, id: impl Into<String>) -> Self {
        self.after.push(id.into());
        self
    }

    pub fn round_before(mut self, id: impl Into<String>) -> Self {
        self.round_before.push(id.into());
        self
    }

    pub fn round_after(mut self, id: impl Into<String>) -> Self {
        self.round_after.push(id.into());
        self
    }

    pub fn boxed(self) -> Box<dyn Transformer> {
        Box::new(self)
    }
}

impl Transformer for FnTransformer {
    fn id(&self) -> &str {
        &self.id
    }

    fn must_run_before(&self) -> Vec<String> {
        self.before.clone()
    }

    fn must_run_after(&self) -> Vec<String> {
        self.after.clone()
    }

    fn must_run_round_before(&self) -> Vec<String> {
        self.round_before.clone()
    }

    fn must_run_round_after(&self) -> Vec<String> {
        self.round_after.clone()
    }

    fn transformations(&self, tree: &Node) -> Result<Vec<Transformation>, BoxError> {
        (self.produce)(tree)
    }
}
