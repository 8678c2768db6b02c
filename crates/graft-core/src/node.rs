//! The shared hierarchical document.
//!
//! Every [`Node`] is a closed sum over list, map, scalar value and a lazily
//! materialized placeholder, plus a [`Metadata`] side-table carrying the
//! node's absolute [`Path`]. Containers live behind `Arc`, so cloning a node
//! is a shallow, structurally shared copy; writes go through
//! `Arc::make_mut`, which copies only the spine from the mutated node up to
//! the node the write started from.
//!
//! Path invariant: every node's recorded path matches its position. All
//! constructors and mutators re-attach paths; re-attachment stops at the
//! first node whose path is already correct, which keeps untouched
//! siblings shared.
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::error::TreeError;
use crate::path::{Path, Step, parse_index, pointer_tokens};

/// Opaque scalar payload of a value node.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Uninterpreted attribute carried through from the compiled unit.
    Raw { tag: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    path: Path,
    annotations: BTreeMap<String, Scalar>,
}

impl Metadata {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn annotations(&self) -> &BTreeMap<String, Scalar> {
        &self.annotations
    }
}

/// Builds the subtree of a lazy node. Returns a human-readable reason on failure.
pub type Thunk = Arc<dyn Fn() -> Result<Node, String> + Send + Sync>;

/// Placeholder for a subtree that is only built on first access.
///
/// The materialized subtree is cached; [`LazyNode::evict`] drops the cache
/// and the next access rebuilds it from the thunk.
#[derive(Clone)]
pub struct LazyNode {
    thunk: Thunk,
    cache: Arc<OnceLock<Node>>,
}

impl LazyNode {
    pub fn new(thunk: Thunk) -> Self {
        Self {
            thunk,
            cache: Arc::new(OnceLock::new()),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.cache.get().is_some()
    }

    pub fn evict(&mut self) {
        self.cache = Arc::new(OnceLock::new());
    }

    /// Materialize at `path`, attaching that path to the fresh subtree.
    pub fn force(&self, path: &Path) -> Result<&Node, TreeError> {
        if let Some(node) = self.cache.get() {
            return Ok(node);
        }
        let mut node = (self.thunk)().map_err(|reason| TreeError::Materialize {
            path: path.clone(),
            reason,
        })?;
        if let NodeKind::Lazy(_) = node.kind {
            return Err(TreeError::Materialize {
                path: path.clone(),
                reason: "thunk produced another lazy node".into(),
            });
        }
        node.attach(path.clone());
        tracing::trace!(path = %path, "materialized lazy node");
        Ok(self.cache.get_or_init(|| node))
    }
}

impl fmt::Debug for LazyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyNode")
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    List(Arc<Vec<Node>>),
    Map(Arc<IndexMap<String, Node>>),
    Value(Scalar),
    Lazy(LazyNode),
}

#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    meta: Metadata,
}

impl Node {
    pub fn list(items: Vec<Node>) -> Self {
        let mut node = Node {
            kind: NodeKind::List(Arc::new(items)),
            meta: Metadata::default(),
        };
        node.reattach_children();
        node
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Node)>) -> Self {
        let map: IndexMap<String, Node> = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let mut node = Node {
            kind: NodeKind::Map(Arc::new(map)),
            meta: Metadata::default(),
        };
        node.reattach_children();
        node
    }

    pub fn value(scalar: Scalar) -> Self {
        Node {
            kind: NodeKind::Value(scalar),
            meta: Metadata::default(),
        }
    }

    pub fn null() -> Self {
        Node::value(Scalar::Null)
    }

    pub fn lazy(thunk: Thunk) -> Self {
        Node {
            kind: NodeKind::Lazy(LazyNode::new(thunk)),
            meta: Metadata::default(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn path(&self) -> &Path {
        &self.meta.path
    }

    pub fn annotation(&self, key: &str) -> Option<&Scalar> {
        self.meta.annotations.get(key)
    }

    pub fn annotate(&mut self, key: impl Into<String>, value: Scalar) {
        self.meta.annotations.insert(key.into(), value);
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: Scalar) -> Self {
        self.annotate(key, value);
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::List(_) => "list",
            NodeKind::Map(_) => "map",
            NodeKind::Value(_) => "value",
            NodeKind::Lazy(_) => "lazy",
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.kind, NodeKind::Lazy(_))
    }

    /// True when this container's buffer is shared with another tree.
    pub fn is_shared(&self) -> bool {
        match &self.kind {
            NodeKind::List(items) => Arc::strong_count(items) > 1,
            NodeKind::Map(map) => Arc::strong_count(map) > 1,
            NodeKind::Lazy(lazy) => Arc::strong_count(&lazy.cache) > 1,
            NodeKind::Value(_) => false,
        }
    }

    /// Follow a lazy node to its materialized subtree; other nodes return themselves.
    pub fn resolved(&self) -> Result<&Node, TreeError> {
        match &self.kind {
            NodeKind::Lazy(lazy) => lazy.force(&self.meta.path),
            _ => Ok(self),
        }
    }

    /// Kind name after materialization.
    pub fn shape(&self) -> Result<&'static str, TreeError> {
        Ok(self.resolved()?.kind_name())
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Node>> {
        match &self.kind {
            NodeKind::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Value(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.as_scalar()? {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.as_scalar()? {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Number of children of a materialized container; `None` for values and lazy nodes.
    pub fn len(&self) -> Option<usize> {
        match &self.kind {
            NodeKind::List(items) => Some(items.len()),
            NodeKind::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Cheap copy sharing every container buffer with `self`.
    pub fn shallow_copy(&self) -> Node {
        self.clone()
    }

    /// Copy that shares no container with `self`. Lazy nodes are materialized.
    pub fn deep_copy(&self) -> Result<Node, TreeError> {
        let node = self.resolved()?;
        let kind = match &node.kind {
            NodeKind::List(items) => NodeKind::List(Arc::new(
                items
                    .iter()
                    .map(Node::deep_copy)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            NodeKind::Map(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (k, v) in map.iter() {
                    out.insert(k.clone(), v.deep_copy()?);
                }
                NodeKind::Map(Arc::new(out))
            }
            NodeKind::Value(s) => NodeKind::Value(s.clone()),
            NodeKind::Lazy(_) => {
                return Err(TreeError::Materialize {
                    path: self.meta.path.clone(),
                    reason: "node still lazy after resolution".into(),
                });
            }
        };
        let mut meta = node.meta.clone();
        meta.path = self.meta.path.clone();
        for (k, v) in &self.meta.annotations {
            meta.annotations.insert(k.clone(), v.clone());
        }
        Ok(Node { kind, meta })
    }

    /// Structural equality of content; metadata is ignored.
    pub fn content_eq(&self, other: &Node) -> bool {
        let (Ok(a), Ok(b)) = (self.resolved(), other.resolved()) else {
            return false;
        };
        match (&a.kind, &b.kind) {
            (NodeKind::List(x), NodeKind::List(y)) => {
                Arc::ptr_eq(x, y)
                    || (x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| p.content_eq(q)))
            }
            (NodeKind::Map(x), NodeKind::Map(y)) => {
                Arc::ptr_eq(x, y)
                    || (x.len() == y.len()
                        && x.iter()
                            .zip(y.iter())
                            .all(|((kp, p), (kq, q))| kp == kq && p.content_eq(q)))
            }
            (NodeKind::Value(x), NodeKind::Value(y)) => x == y,
            _ => false,
        }
    }

    // ---- reads ----

    /// Step into one child, materializing `self` if it is lazy.
    pub fn child(&self, step: &Step) -> Result<&Node, TreeError> {
        let node = self.resolved()?;
        match (&node.kind, step) {
            (NodeKind::List(items), Step::Index(i)) => {
                items.get(*i).ok_or_else(|| TreeError::PathResolution {
                    path: node.meta.path.clone(),
                    step: step.clone(),
                    len: items.len(),
                })
            }
            (NodeKind::Map(map), Step::Key(k)) => {
                map.get(k).ok_or_else(|| TreeError::MissingKey {
                    path: node.meta.path.clone(),
                    key: k.clone(),
                })
            }
            _ => Err(TreeError::TypeMismatch {
                path: node.meta.path.clone(),
                step: step.clone(),
                found: node.kind_name(),
            }),
        }
    }

    /// Resolve `path` relative to this node.
    pub fn get(&self, path: &Path) -> Result<&Node, TreeError> {
        let mut cur = self;
        for step in path {
            cur = cur.child(step)?;
        }
        cur.resolved()
    }

    /// Interpret a pointer against this tree: each token becomes an index or
    /// a key depending on the node it steps into. The final token only needs
    /// its parent to exist.
    pub fn pointer_path(&self, pointer: &str) -> Result<Path, TreeError> {
        let tokens: Vec<String> = pointer_tokens(pointer).collect();
        let mut path = self.meta.path.clone();
        let mut cur = self;
        for (n, tok) in tokens.iter().enumerate() {
            let node = cur.resolved()?;
            let step = match &node.kind {
                NodeKind::List(_) => Step::Index(parse_index(tok).ok_or_else(|| {
                    TreeError::InvalidPointer {
                        pointer: pointer.to_string(),
                        reason: format!("{tok:?} is not a list index"),
                    }
                })?),
                NodeKind::Map(_) => Step::Key(tok.clone()),
                _ => {
                    return Err(TreeError::TypeMismatch {
                        path: path.clone(),
                        step: Step::Key(tok.clone()),
                        found: node.kind_name(),
                    });
                }
            };
            if n + 1 < tokens.len() {
                cur = node.child(&step)?;
            }
            path.push(step);
        }
        Ok(path)
    }

    // ---- writes ----

    /// Replace a lazy node by its materialized subtree, keeping this node's metadata.
    fn materialize_in_place(&mut self) -> Result<(), TreeError> {
        if let NodeKind::Lazy(lazy) = &self.kind {
            let forced = lazy.force(&self.meta.path)?;
            let kind = forced.kind.clone();
            let mut annotations = forced.meta.annotations.clone();
            annotations.append(&mut self.meta.annotations);
            self.meta.annotations = annotations;
            self.kind = kind;
        }
        Ok(())
    }

    fn child_mut(&mut self, step: &Step) -> Result<&mut Node, TreeError> {
        self.materialize_in_place()?;
        let found = self.kind_name();
        let path = &self.meta.path;
        match (&mut self.kind, step) {
            (NodeKind::List(items), Step::Index(i)) => {
                let len = items.len();
                Arc::make_mut(items)
                    .get_mut(*i)
                    .ok_or_else(|| TreeError::PathResolution {
                        path: path.clone(),
                        step: step.clone(),
                        len,
                    })
            }
            (NodeKind::Map(map), Step::Key(k)) => {
                Arc::make_mut(map)
                    .get_mut(k)
                    .ok_or_else(|| TreeError::MissingKey {
                        path: path.clone(),
                        key: k.clone(),
                    })
            }
            _ => Err(TreeError::TypeMismatch {
                path: path.clone(),
                step: step.clone(),
                found,
            }),
        }
    }

    /// Mutable access for in-crate writers. Copies the shared spine along `path`.
    pub(crate) fn get_mut(&mut self, path: &Path) -> Result<&mut Node, TreeError> {
        let mut cur = self;
        for step in path {
            cur = cur.child_mut(step)?;
        }
        cur.materialize_in_place()?;
        Ok(cur)
    }

    /// Write `node` at `path` (relative to `self`) and return the node it replaced.
    ///
    /// Map keys that do not exist yet are appended. Writing the empty path
    /// replaces `self`.
    pub fn set(&mut self, path: &Path, node: Node) -> Result<Option<Node>, TreeError> {
        let Some((last, parent_steps)) = path.steps().split_last() else {
            let at = self.meta.path.clone();
            let old = std::mem::replace(self, node);
            self.attach(at);
            return Ok(Some(old));
        };
        let parent = self.get_mut(&Path::from_steps(parent_steps.to_vec()))?;
        let child_path = parent.meta.path.clone().child(last.clone());
        let found = parent.kind_name();
        let mut node = node;
        node.attach(child_path);
        match (&mut parent.kind, last) {
            (NodeKind::List(items), Step::Index(i)) => {
                let len = items.len();
                let slot = Arc::make_mut(items)
                    .get_mut(*i)
                    .ok_or_else(|| TreeError::PathResolution {
                        path: parent.meta.path.clone(),
                        step: last.clone(),
                        len,
                    })?;
                Ok(Some(std::mem::replace(slot, node)))
            }
            (NodeKind::Map(map), Step::Key(k)) => Ok(Arc::make_mut(map).insert(k.clone(), node)),
            _ => Err(TreeError::TypeMismatch {
                path: parent.meta.path.clone(),
                step: last.clone(),
                found,
            }),
        }
    }

    /// Replace the elements `range` of the list at `list_path` with `items`
    /// and return the removed elements. Later siblings are re-attached at
    /// their shifted positions.
    pub fn splice(
        &mut self,
        list_path: &Path,
        range: Range<usize>,
        items: Vec<Node>,
    ) -> Result<Vec<Node>, TreeError> {
        let list = self.get_mut(list_path)?;
        let found = list.kind_name();
        let base = list.meta.path.clone();
        let NodeKind::List(buf) = &mut list.kind else {
            return Err(TreeError::ShapeMismatch {
                path: base,
                expected: "list",
                found,
            });
        };
        if range.start > range.end || range.end > buf.len() {
            return Err(TreeError::InvalidSlice {
                path: base,
                start: range.start,
                end: range.end,
                len: buf.len(),
            });
        }
        let start = range.start;
        let buf = Arc::make_mut(buf);
        let removed: Vec<Node> = buf.splice(range, items).collect();
        for (i, item) in buf.iter_mut().enumerate().skip(start) {
            item.attach(base.clone().index(i));
        }
        Ok(removed)
    }

    /// Append to the list at `list_path`.
    pub fn push(&mut self, list_path: &Path, item: Node) -> Result<(), TreeError> {
        let list = self.get(list_path)?;
        let len = list
            .as_list()
            .map(<[Node]>::len)
            .ok_or_else(|| TreeError::ShapeMismatch {
                path: list_path.clone(),
                expected: "list",
                found: list.kind_name(),
            })?;
        self.splice(list_path, len..len, vec![item]).map(|_| ())
    }

    /// Record this node (and its subtree) as living at `path`.
    pub(crate) fn attach(&mut self, path: Path) {
        if self.meta.path == path {
            return;
        }
        self.meta.path = path;
        self.reattach_children();
    }

    fn reattach_children(&mut self) {
        let base = &self.meta.path;
        match &mut self.kind {
            NodeKind::List(items) => {
                if items
                    .iter()
                    .enumerate()
                    .all(|(i, it)| is_child_at(&it.meta.path, base, &Step::Index(i)))
                {
                    return;
                }
                for (i, item) in Arc::make_mut(items).iter_mut().enumerate() {
                    item.attach(base.clone().index(i));
                }
            }
            NodeKind::Map(map) => {
                if map
                    .iter()
                    .all(|(k, v)| is_child_at(&v.meta.path, base, &Step::Key(k.clone())))
                {
                    return;
                }
                for (k, v) in Arc::make_mut(map).iter_mut() {
                    v.attach(base.clone().key(k.clone()));
                }
            }
            // Clones share one cache; a moved copy must not see subtrees
            // forced at the old location.
            NodeKind::Lazy(lazy) => lazy.evict(),
            NodeKind::Value(_) => {}
        }
    }

    /// Indented multi-line rendering for diagnostics.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.fmt_pretty(0, &mut out).ok();
        out
    }

    fn fmt_pretty(&self, indent: usize, out: &mut String) -> fmt::Result {
        let pad = |n: usize| -> String { " ".repeat(n) };
        match &self.kind {
            NodeKind::Value(s) => writeln!(out, "{s}"),
            NodeKind::Lazy(lazy) if !lazy.is_materialized() => writeln!(out, "<lazy>"),
            NodeKind::Lazy(_) => match self.resolved() {
                Ok(node) => node.fmt_pretty(indent, out),
                Err(e) => writeln!(out, "<lazy: {e}>"),
            },
            NodeKind::List(items) => {
                writeln!(out, "[")?;
                for it in items.iter() {
                    write!(out, "{}", pad(indent + 2))?;
                    it.fmt_pretty(indent + 2, out)?;
                }
                writeln!(out, "{}]", pad(indent))
            }
            NodeKind::Map(map) => {
                writeln!(out, "{{")?;
                for (name, val) in map.iter() {
                    write!(out, "{}{}: ", pad(indent + 2), name)?;
                    val.fmt_pretty(indent + 2, out)?;
                }
                writeln!(out, "{}}}", pad(indent))
            }
        }
    }
}

fn is_child_at(path: &Path, base: &Path, step: &Step) -> bool {
    path.len() == base.len() + 1 && path.starts_with(base) && path.last() == Some(step)
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.content_eq(other)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Str(s) => write!(f, "{s:?}"),
            Scalar::Bytes(b) => write!(f, "<bytes {}>", b.len()),
            Scalar::Raw { tag, bytes } => write!(f, "<raw {tag} {}>", bytes.len()),
        }
    }
}

impl From<Scalar> for Node {
    fn from(s: Scalar) -> Self {
        Node::value(s)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Self {
        Node::value(Scalar::Int(i))
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::value(Scalar::Bool(b))
    }
}

impl From<f64> for Node {
    fn from(x: f64) -> Self {
        Node::value(Scalar::Float(x))
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::value(Scalar::Str(s.to_owned()))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::value(Scalar::Str(s))
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::list(items)
    }
}
