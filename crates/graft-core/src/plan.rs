//! Declarative transformers loaded from a JSON plan.
//!
//! ```json
//! { "transformers": [
//!     { "id": "rename", "mustRunAfter": ["strip"],
//!       "edits": [ { "op": "set", "path": "/name", "value": "main" } ] } ] }
//! ```
//!
//! Pointers are resolved against the tree of the round that produces the
//! edits, so later rounds see earlier rounds' changes.
use serde::Deserialize;
use serde_json::Value as J;

use crate::error::{BoxError, PlanError, TreeError};
use crate::json::json_to_node;
use crate::node::Node;
use crate::path::Path;
use crate::target::Target;
use crate::transformer::{Transformation, Transformer};

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    pub transformers: Vec<PlanTransformer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTransformer {
    pub id: String,
    #[serde(default)]
    pub must_run_before: Vec<String>,
    #[serde(default)]
    pub must_run_after: Vec<String>,
    #[serde(default)]
    pub must_run_round_before: Vec<String>,
    #[serde(default)]
    pub must_run_round_after: Vec<String>,
    #[serde(default)]
    pub edits: Vec<Edit>,
}

/// Element indices are undoubled; `end` is exclusive.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Edit {
    Set { path: String, value: J },
    Splice {
        list: String,
        start: usize,
        end: usize,
        items: Vec<J>,
    },
    Insert {
        list: String,
        index: usize,
        items: Vec<J>,
    },
    Append { list: String, items: Vec<J> },
    Remove { list: String, start: usize, end: usize },
    Copy { from: String, to: String },
}

pub fn load_plan(json: &str) -> Result<Plan, PlanError> {
    Ok(serde_json::from_str(json)?)
}

impl Plan {
    pub fn into_transformers(self) -> Vec<Box<dyn Transformer>> {
        self.transformers
            .into_iter()
            .map(|t| Box::new(t) as Box<dyn Transformer>)
            .collect()
    }
}

impl PlanTransformer {
    fn pointer(&self, tree: &Node, pointer: &str) -> Result<Path, PlanError> {
        tree.pointer_path(pointer)
            .map_err(|source| self.pointer_error(source))
    }

    fn pointer_error(&self, source: TreeError) -> PlanError {
        PlanError::Pointer {
            transformer: self.id.clone(),
            source,
        }
    }

    fn list_len(&self, tree: &Node, list: &Path) -> Result<usize, PlanError> {
        let node = tree.get(list).map_err(|source| self.pointer_error(source))?;
        node.as_list()
            .map(<[Node]>::len)
            .ok_or_else(|| PlanError::Invalid {
                transformer: self.id.clone(),
                reason: format!("{list} is a {}, not a list", node.kind_name()),
            })
    }

    fn edit(&self, tree: &Node, edit: &Edit) -> Result<Transformation, PlanError> {
        let items = |items: &[J]| Node::list(items.iter().map(json_to_node).collect());
        let t = match edit {
            Edit::Set { path, value } => {
                Transformation::replace_with(Target::node(self.pointer(tree, path)?), json_to_node(value))
            }
            Edit::Splice {
                list,
                start,
                end,
                items: new,
            } => {
                let list = self.pointer(tree, list)?;
                if start > end {
                    return Err(PlanError::Invalid {
                        transformer: self.id.clone(),
                        reason: format!("splice start {start} is past end {end}"),
                    });
                }
                Transformation::replace_with(Target::slice(list, *start..*end), items(new))
            }
            Edit::Insert {
                list,
                index,
                items: new,
            } => {
                let list = self.pointer(tree, list)?;
                Transformation::replace_with(Target::insertion(list, *index), items(new))
            }
            Edit::Append { list, items: new } => {
                let list = self.pointer(tree, list)?;
                let len = self.list_len(tree, &list)?;
                Transformation::replace_with(Target::insertion(list, len), items(new))
            }
            Edit::Remove { list, start, end } => {
                let list = self.pointer(tree, list)?;
                Transformation::replace_with(Target::slice(list, *start..*end), Node::list(Vec::new()))
            }
            Edit::Copy { from, to } => {
                let from = self.pointer(tree, from)?;
                let to = self.pointer(tree, to)?;
                Transformation::new(Target::node(to), |_, mut sources| {
                    sources
                        .swap_remove("from")
                        .ok_or_else(|| BoxError::from("copy source was not resolved"))
                })
                .with_source("from", Target::node(from))
            }
        };
        Ok(t)
    }
}

impl Transformer for PlanTransformer {
    fn id(&self) -> &str {
        &self.id
    }

    fn must_run_before(&self) -> Vec<String> {
        self.must_run_before.clone()
    }

    fn must_run_after(&self) -> Vec<String> {
        self.must_run_after.clone()
    }

    fn must_run_round_before(&self) -> Vec<String> {
        self.must_run_round_before.clone()
    }

    fn must_run_round_after(&self) -> Vec<String> {
        self.must_run_round_after.clone()
    }

    fn transformations(&self, tree: &Node) -> Result<Vec<Transformation>, BoxError> {
        self.edits
            .iter()
            .map(|e| self.edit(tree, e).map_err(BoxError::from))
            .collect()
    }
}
