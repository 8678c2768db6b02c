// JSON projection of trees, for inspection and for authoring replacement values.
//
// - Lists and maps map onto JSON arrays and objects (map order preserved).
// - Bytes render as `{"$bytes":[..]}`, or as `{"$type":"bytes","len":n}`
//   summaries when `bytes_summary` is set.
// - Raw attributes render as `{"$raw":tag,"$bytes":[..]}`.
use std::path::Path as FsPath;

use serde_json::{Value as J, json};

use crate::codec::{DecodeOpts, read_unit_file};
use crate::error::CodecError;
use crate::node::{Node, NodeKind, Scalar};
use crate::units::find_unit_files;

#[derive(Debug, Clone, Copy)]
pub struct JsonOpts {
    pub max_array_elems: usize,
    pub max_depth: usize,
    pub bytes_summary: bool,
}

impl Default for JsonOpts {
    fn default() -> Self {
        Self {
            max_array_elems: 128,
            max_depth: 16,
            bytes_summary: true,
        }
    }
}

impl JsonOpts {
    /// No truncation, full bytes: output converts back with [`json_to_node`].
    pub fn lossless() -> Self {
        Self {
            max_array_elems: usize::MAX,
            max_depth: usize::MAX,
            bytes_summary: false,
        }
    }
}

pub fn node_to_json(node: &Node, opts: JsonOpts) -> J {
    write_value(node, 0, &opts)
}

fn write_value(node: &Node, depth: usize, opts: &JsonOpts) -> J {
    let node = match node.resolved() {
        Ok(n) => n,
        Err(e) => return json!({ "$error": e.to_string() }),
    };
    match node.kind() {
        NodeKind::Value(s) => write_scalar(s, opts),
        NodeKind::List(items) => {
            let max = opts.max_array_elems.min(items.len());
            let mut arr = Vec::with_capacity(max + 1);
            for it in items.iter().take(max) {
                if depth >= opts.max_depth {
                    arr.push(J::Null);
                } else {
                    arr.push(write_value(it, depth + 1, opts));
                }
            }
            if items.len() > max {
                arr.push(json!({"$truncated": true, "$omitted": items.len() - max }));
            }
            J::Array(arr)
        }
        NodeKind::Map(members) => {
            let mut map = serde_json::Map::with_capacity(members.len());
            for (name, val) in members.iter() {
                let vv = if depth >= opts.max_depth {
                    J::Null
                } else {
                    write_value(val, depth + 1, opts)
                };
                map.insert(name.clone(), vv);
            }
            J::Object(map)
        }
        NodeKind::Lazy(_) => J::Null,
    }
}

fn write_scalar(s: &Scalar, opts: &JsonOpts) -> J {
    match s {
        Scalar::Null => J::Null,
        Scalar::Bool(b) => J::Bool(*b),
        Scalar::Int(i) => json!(*i),
        Scalar::Float(x) => serde_json::Number::from_f64(*x)
            .map(J::Number)
            .unwrap_or(J::Null),
        Scalar::Str(v) => J::String(v.clone()),
        Scalar::Bytes(b) => {
            if opts.bytes_summary {
                json!({"$type": "bytes", "len": b.len()})
            } else {
                json!({ "$bytes": b })
            }
        }
        Scalar::Raw { tag, bytes } => {
            if opts.bytes_summary {
                json!({"$raw": tag, "len": bytes.len()})
            } else {
                json!({"$raw": tag, "$bytes": bytes})
            }
        }
    }
}

/// Build a tree from JSON. Objects shaped like the `$bytes`/`$raw` encodings
/// above become scalars; every other object becomes a map.
pub fn json_to_node(value: &J) -> Node {
    match value {
        J::Null => Node::value(Scalar::Null),
        J::Bool(b) => Node::value(Scalar::Bool(*b)),
        J::Number(n) => match n.as_i64() {
            Some(i) => Node::value(Scalar::Int(i)),
            None => Node::value(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        J::String(s) => Node::value(Scalar::Str(s.clone())),
        J::Array(items) => Node::list(items.iter().map(json_to_node).collect()),
        J::Object(map) => {
            if let Some(scalar) = special_scalar(map) {
                return Node::value(scalar);
            }
            Node::map(map.iter().map(|(k, v)| (k.clone(), json_to_node(v))))
        }
    }
}

fn special_scalar(map: &serde_json::Map<String, J>) -> Option<Scalar> {
    let bytes = map.get("$bytes").and_then(byte_array);
    match (map.get("$raw"), bytes) {
        (Some(J::String(tag)), Some(bytes)) if map.len() == 2 => Some(Scalar::Raw {
            tag: tag.clone(),
            bytes,
        }),
        (None, Some(bytes)) if map.len() == 1 => Some(Scalar::Bytes(bytes)),
        _ => None,
    }
}

fn byte_array(v: &J) -> Option<Vec<u8>> {
    v.as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

pub fn dump_file_json(path: &FsPath, opts: JsonOpts) -> Result<String, CodecError> {
    let root = read_unit_file(path, DecodeOpts::default())?;
    let out = serde_json::to_string_pretty(&node_to_json(&root, opts))
        .map_err(|e| CodecError::Io(std::io::Error::other(e)))?;
    Ok(out)
}

/// `{ "<file name>": <tree> }` for every unit file under `dir`; unreadable
/// files map to `{"$error": ..}`.
pub fn dump_dir_json(dir: &FsPath, opts: JsonOpts) -> Result<String, CodecError> {
    let mut out = serde_json::Map::new();
    for f in find_unit_files(dir)? {
        let name = f
            .strip_prefix(dir)
            .unwrap_or(&f)
            .to_string_lossy()
            .replace('\\', "/");
        let value = match read_unit_file(&f, DecodeOpts::default()) {
            Ok(root) => node_to_json(&root, opts),
            Err(e) => json!({ "$error": e.to_string() }),
        };
        out.insert(name, value);
    }
    serde_json::to_string_pretty(&J::Object(out))
        .map_err(|e| CodecError::Io(std::io::Error::other(e)))
}
