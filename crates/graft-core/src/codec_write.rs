use crate::codec::{MAGIC, RecordType, VERSION};
use crate::error::CodecError;
use crate::node::{Node, NodeKind, Scalar};

/// Serialize a tree back to unit bytes. Lazy nodes are materialized first.
/// Output depends only on tree content and map insertion order.
pub fn encode_unit(root: &Node) -> Result<Vec<u8>, CodecError> {
    let mut w = Writer::new();
    w.header();
    w.write_node(root)?;
    Ok(w.out)
}

pub fn write_unit_file(path: &std::path::Path, root: &Node) -> Result<(), CodecError> {
    let data = encode_unit(root)?;
    std::fs::write(path, data)?;
    Ok(())
}

struct Writer {
    out: Vec<u8>,
}
impl Writer {
    fn new() -> Self {
        Self {
            out: Vec::with_capacity(1024),
        }
    }
    fn push(&mut self, b: u8) {
        self.out.push(b);
    }
    fn tag(&mut self, rec: RecordType) {
        self.push(rec as u8);
    }
    fn write_i64(&mut self, v: i64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }
    fn write_f64(&mut self, v: f64) {
        self.out.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    fn write_7(&mut self, mut v: usize) {
        while v >= 0x80 {
            self.push(((v as u8) & 0x7F) | 0x80);
            v >>= 7;
        }
        self.push(v as u8);
    }
    fn write_lp_str(&mut self, s: &str) {
        self.write_7(s.len());
        self.out.extend_from_slice(s.as_bytes());
    }
    fn write_bytes(&mut self, b: &[u8]) {
        self.write_7(b.len());
        self.out.extend_from_slice(b);
    }

    fn header(&mut self) {
        self.out.extend_from_slice(MAGIC);
        self.push(VERSION);
    }

    fn write_node(&mut self, node: &Node) -> Result<(), CodecError> {
        let node = node.resolved()?;
        match node.kind() {
            NodeKind::Value(s) => self.write_scalar(s),
            NodeKind::List(items) => {
                let mut body = Writer::new();
                body.write_7(items.len());
                for it in items.iter() {
                    body.write_node(it)?;
                }
                self.tag(RecordType::List);
                self.write_bytes(&body.out);
            }
            NodeKind::Map(map) => {
                let mut body = Writer::new();
                body.write_7(map.len());
                for (k, v) in map.iter() {
                    body.write_lp_str(k);
                    body.write_node(v)?;
                }
                self.tag(RecordType::Map);
                self.write_bytes(&body.out);
            }
            NodeKind::Lazy(_) => {
                return Err(CodecError::Tree(crate::error::TreeError::Materialize {
                    path: node.path().clone(),
                    reason: "node still lazy after resolution".into(),
                }));
            }
        }
        Ok(())
    }

    fn write_scalar(&mut self, s: &Scalar) {
        match s {
            Scalar::Null => self.tag(RecordType::Null),
            Scalar::Bool(false) => self.tag(RecordType::False),
            Scalar::Bool(true) => self.tag(RecordType::True),
            Scalar::Int(i) => {
                self.tag(RecordType::Int);
                self.write_i64(*i);
            }
            Scalar::Float(x) => {
                self.tag(RecordType::Float);
                self.write_f64(*x);
            }
            Scalar::Str(v) => {
                self.tag(RecordType::Str);
                self.write_lp_str(v);
            }
            Scalar::Bytes(b) => {
                self.tag(RecordType::Bytes);
                self.write_bytes(b);
            }
            Scalar::Raw { tag, bytes } => {
                self.tag(RecordType::Raw);
                self.write_lp_str(tag);
                self.write_bytes(bytes);
            }
        }
    }
}
