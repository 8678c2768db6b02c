//! Addresses into the tree.
//!
//! A [`Path`] is a sequence of [`Step`]s from the root: list indices and map
//! keys. Paths display in pointer form (`/functions/3/body`), with `~0`/`~1`
//! escaping for keys as in RFC 6901.
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    /// Position inside a list node.
    Index(usize),
    /// Member of a map node.
    Key(String),
}

impl Step {
    pub fn key(k: impl Into<String>) -> Self {
        Step::Key(k.into())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Index(i) => write!(f, "{i}"),
            Step::Key(k) => f.write_str(&escape_token(k)),
        }
    }
}

impl From<usize> for Step {
    fn from(i: usize) -> Self {
        Step::Index(i)
    }
}

impl From<&str> for Step {
    fn from(k: &str) -> Self {
        Step::Key(k.to_owned())
    }
}

impl From<String> for Step {
    fn from(k: String) -> Self {
        Step::Key(k)
    }
}

/// Absolute location of a node. The root is the empty path.
///
/// Ordering is lexicographic over steps, which groups paths sharing a prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<Step>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self(steps)
    }

    /// Builder: append a step.
    pub fn child(mut self, step: impl Into<Step>) -> Self {
        self.0.push(step.into());
        self
    }

    /// Builder: append a list index.
    pub fn index(self, i: usize) -> Self {
        self.child(Step::Index(i))
    }

    /// Builder: append a map key.
    pub fn key(self, k: impl Into<String>) -> Self {
        self.child(Step::Key(k.into()))
    }

    pub fn push(&mut self, step: Step) {
        self.0.push(step);
    }

    pub fn pop(&mut self) -> Option<Step> {
        self.0.pop()
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn step(&self, depth: usize) -> Option<&Step> {
        self.0.get(depth)
    }

    pub fn step_mut(&mut self, depth: usize) -> Option<&mut Step> {
        self.0.get_mut(depth)
    }

    pub fn last(&self) -> Option<&Step> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path with the last step dropped; the root is its own parent.
    pub fn parent(&self) -> Path {
        let mut steps = self.0.clone();
        steps.pop();
        Path(steps)
    }

    /// Prefix test: `self` equals `other` or descends from it.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Strict descendant test.
    pub fn is_descendant_of(&self, other: &Path) -> bool {
        self.0.len() > other.0.len() && self.starts_with(other)
    }

    /// Parse pointer syntax where every all-digit token is an index.
    ///
    /// Use [`crate::node::Node::pointer_path`] when keys may look numeric.
    pub fn parse(pointer: &str) -> Path {
        let steps = pointer_tokens(pointer)
            .map(|tok| match parse_index(&tok) {
                Some(i) => Step::Index(i),
                None => Step::Key(tok),
            })
            .collect();
        Path(steps)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for step in &self.0 {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

impl From<Vec<Step>> for Path {
    fn from(steps: Vec<Step>) -> Self {
        Path(steps)
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Split a pointer into unescaped tokens. `""` and `"/"` are the root.
pub(crate) fn pointer_tokens(pointer: &str) -> impl Iterator<Item = String> + '_ {
    let trimmed = pointer.strip_prefix('/').unwrap_or(pointer);
    trimmed
        .split('/')
        .filter(move |_| !trimmed.is_empty())
        .map(unescape_token)
}

pub(crate) fn parse_index(tok: &str) -> Option<usize> {
    if tok.is_empty() || !tok.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tok.parse().ok()
}

fn unescape_token(tok: &str) -> String {
    let s = tok.replace("~1", "/");
    s.replace("~0", "~")
}

fn escape_token(tok: &str) -> String {
    let s = tok.replace('~', "~0");
    s.replace('/', "~1")
}
