//! graft-core: ordering and application engine for independent transformers
//! over compiled units.
//!
//! The crate is organized leaves first:
//! - `node`, `path`, `target`: the shared tree, addresses, and write intents
//! - `transformer`: the registration surface and per-round transformations
//! - `schedule`: transformer-level rounds from declared constraints
//! - `order`: transformation-level order from target/source overlap
//! - `apply`, `engine`: sequential application and the multi-round driver
//! - `codec`, `codec_write`, `json`, `plan`, `units`: unit files, JSON
//!   projection, declarative plans, and directory backup
//!
pub mod apply;
pub mod codec;
pub mod codec_write;
pub mod engine;
pub mod error;
pub mod json;
pub mod node;
pub mod order;
pub mod path;
pub mod plan;
pub mod schedule;
pub mod target;
pub mod transformer;
pub mod units;

pub use codec::{DecodeOpts, decode_unit, read_unit_file};
pub use codec_write::{encode_unit, write_unit_file};
pub use engine::{Patcher, PlannedRound, RoundReport, RunReport};
pub use error::{BoxError, CodecError, ConfigError, PatchError, PlanError, TreeError};
pub use json::{JsonOpts, json_to_node, node_to_json};
pub use node::{Node, NodeKind, Scalar};
pub use order::{DependencyGraph, Schedule, derive_dependencies, sort_dependencies};
pub use path::{Path, Step};
pub use plan::{Plan, load_plan};
pub use schedule::plan_rounds;
pub use target::{NodeTarget, SliceTarget, Target};
pub use transformer::{FnTransformer, Transformation, TransformationId, Transformer};
