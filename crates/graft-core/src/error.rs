//! Error types for tree access, configuration, ordering and application.
use thiserror::Error;

use crate::path::{Path, Step};
use crate::transformer::TransformationId;

/// Boxed error raised by an opaque `apply` capability or a transformer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("type mismatch at {path}: step {step} does not fit a {found} node")]
    TypeMismatch {
        path: Path,
        step: Step,
        found: &'static str,
    },

    #[error("cannot resolve {path}: step {step} is out of range (len {len})")]
    PathResolution { path: Path, step: Step, len: usize },

    #[error("missing key at {path}: {key}")]
    MissingKey { path: Path, key: String },

    #[error("failed to materialize lazy node at {path}: {reason}")]
    Materialize { path: Path, reason: String },

    #[error("shape mismatch at {path}: expected {expected}, found {found}")]
    ShapeMismatch {
        path: Path,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid slice at {path}: [{start}, {end}) in list of len {len}")]
    InvalidSlice {
        path: Path,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("invalid pointer {pointer}: {reason}")]
    InvalidPointer { pointer: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate transformer id: {id}")]
    DuplicateTransformer { id: String },

    #[error("transformer {transformer} references unknown transformer {dependency}")]
    UnknownDependency {
        transformer: String,
        dependency: String,
    },
}

/// Fatal failure of a patch run. Nothing is retried.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("transformer ordering is unsatisfiable; cycle among: {}", .remaining.join(", "))]
    UnsatisfiableOrdering { remaining: Vec<String> },

    #[error(
        "round {round}: transformations cannot be ordered (hard dependency cycle among {})",
        display_ids(.remaining)
    )]
    UnsortableTransformations {
        round: usize,
        remaining: Vec<TransformationId>,
    },

    #[error("transformer {transformer} failed to produce transformations: {source}")]
    Produce {
        transformer: String,
        #[source]
        source: BoxError,
    },

    #[error("{transformation}: {source}")]
    Resolution {
        transformation: TransformationId,
        #[source]
        source: TreeError,
    },

    #[error("{transformation}: apply failed: {source}")]
    Apply {
        transformation: TransformationId,
        #[source]
        source: BoxError,
    },

    #[error("{transformation}: invalid replacement: {source}")]
    Replacement {
        transformation: TransformationId,
        #[source]
        source: TreeError,
    },
}

fn display_ids(ids: &[TransformationId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("eof at {pos:#x}")]
    Eof { pos: usize },

    #[error("bad magic header")]
    BadMagic,

    #[error("unsupported unit version {version}")]
    UnsupportedVersion { version: u8 },

    #[error("unknown record tag {tag:#x} at {pos:#x}")]
    UnknownTag { tag: u8, pos: usize },

    #[error("invalid utf8 in string at {pos:#x}")]
    InvalidUtf8 { pos: usize },

    #[error("7bit length too large at {pos:#x}")]
    LengthOverflow { pos: usize },

    #[error("container body at {pos:#x} declared {declared} bytes, used {used}")]
    BodyLength {
        pos: usize,
        declared: usize,
        used: usize,
    },

    #[error("duplicate map key {key:?} at {pos:#x}")]
    DuplicateKey { key: String, pos: usize },

    #[error("trailing bytes after root at {pos:#x}")]
    TrailingBytes { pos: usize },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("invalid plan: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan transformer {transformer}: {source}")]
    Pointer {
        transformer: String,
        #[source]
        source: TreeError,
    },

    #[error("plan transformer {transformer}: {reason}")]
    Invalid { transformer: String, reason: String },
}
