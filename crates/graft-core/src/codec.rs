// Reader for the compiled-unit container format.
//
// Layout: magic `GRFT`, one version byte, then a single root record.
// Records start with a tag byte. Containers carry a 7-bit encoded body
// length so a reader can skip them and decode the body later.
use std::fs;
use std::path::Path as FsPath;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::CodecError;
use crate::node::{Node, Scalar};

pub const MAGIC: &[u8; 4] = b"GRFT";
pub const VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Null = 0,
    False = 1,
    True = 2,
    Int = 3,
    Float = 4,
    Str = 5,
    Bytes = 6,
    Raw = 7,
    List = 8,
    Map = 9,
}

impl RecordType {
    fn from_u8(tag: u8) -> Option<Self> {
        let t = match tag {
            0 => RecordType::Null,
            1 => RecordType::False,
            2 => RecordType::True,
            3 => RecordType::Int,
            4 => RecordType::Float,
            5 => RecordType::Str,
            6 => RecordType::Bytes,
            7 => RecordType::Raw,
            8 => RecordType::List,
            9 => RecordType::Map,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOpts {
    /// Containers at this depth or deeper are decoded on first access.
    /// `None` decodes everything eagerly.
    pub lazy_depth: Option<usize>,
}

/// Decode a whole unit.
pub fn decode_unit(data: impl Into<Arc<[u8]>>, opts: DecodeOpts) -> Result<Node, CodecError> {
    let data: Arc<[u8]> = data.into();
    let mut parser = Parser::new(data, opts);
    parser.parse_unit()
}

pub fn read_unit_file(path: &FsPath, opts: DecodeOpts) -> Result<Node, CodecError> {
    let data = fs::read(path)?;
    decode_unit(data, opts)
}

#[derive(Debug)]
pub struct Parser {
    data: Arc<[u8]>,
    pos: usize,
    opts: DecodeOpts,
}

impl Parser {
    pub fn new(data: Arc<[u8]>, opts: DecodeOpts) -> Self {
        Self { data, pos: 0, opts }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn parse_unit(&mut self) -> Result<Node, CodecError> {
        let magic = self.read_slice(MAGIC.len())?;
        if magic != MAGIC {
            return Err(CodecError::BadMagic);
        }
        let version = self.read_u8()?;
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion { version });
        }
        let root = self.read_node(0)?;
        if self.pos != self.data.len() {
            return Err(CodecError::TrailingBytes { pos: self.pos });
        }
        Ok(root)
    }

    fn read_node(&mut self, depth: usize) -> Result<Node, CodecError> {
        let at = self.pos;
        let tag = self.read_u8()?;
        let rec = RecordType::from_u8(tag).ok_or(CodecError::UnknownTag { tag, pos: at })?;
        let node = match rec {
            RecordType::Null => Node::value(Scalar::Null),
            RecordType::False => Node::value(Scalar::Bool(false)),
            RecordType::True => Node::value(Scalar::Bool(true)),
            RecordType::Int => Node::value(Scalar::Int(self.read_i64()?)),
            RecordType::Float => Node::value(Scalar::Float(self.read_f64()?)),
            RecordType::Str => Node::value(Scalar::Str(self.read_lp_string()?)),
            RecordType::Bytes => {
                let len = self.read_7bit_len()?;
                Node::value(Scalar::Bytes(self.read_slice(len)?.to_vec()))
            }
            RecordType::Raw => {
                let tag = self.read_lp_string()?;
                let len = self.read_7bit_len()?;
                let bytes = self.read_slice(len)?.to_vec();
                Node::value(Scalar::Raw { tag, bytes })
            }
            RecordType::List | RecordType::Map => {
                let len = self.read_7bit_len()?;
                let body = self.pos;
                let end = body.checked_add(len).ok_or(CodecError::LengthOverflow { pos: body })?;
                if end > self.data.len() {
                    return Err(CodecError::Eof { pos: self.data.len() });
                }
                if self.opts.lazy_depth.is_some_and(|d| depth >= d) {
                    self.pos = end;
                    lazy_container(self.data.clone(), rec, body, end)
                } else {
                    let node = self.read_body(rec, depth)?;
                    if self.pos != end {
                        return Err(CodecError::BodyLength {
                            pos: body,
                            declared: len,
                            used: self.pos - body,
                        });
                    }
                    node
                }
            }
        };
        Ok(node)
    }

    fn read_body(&mut self, rec: RecordType, depth: usize) -> Result<Node, CodecError> {
        let count = self.read_7bit_len()?;
        if rec == RecordType::List {
            let mut items = Vec::with_capacity(count.min(self.remaining()));
            for _ in 0..count {
                items.push(self.read_node(depth + 1)?);
            }
            Ok(Node::list(items))
        } else {
            let mut members = IndexMap::with_capacity(count.min(self.remaining()));
            for _ in 0..count {
                let at = self.pos;
                let name = self.read_lp_string()?;
                let value = self.read_node(depth + 1)?;
                if members.contains_key(&name) {
                    return Err(CodecError::DuplicateKey { key: name, pos: at });
                }
                members.insert(name, value);
            }
            Ok(Node::map(members))
        }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    // Low-level utilities
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or(CodecError::Eof { pos: self.pos })?;
        self.pos += 1;
        Ok(b)
    }
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let s = self.read_slice(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(s);
        Ok(u64::from_le_bytes(buf))
    }
    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.read_u64()? as i64)
    }
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64()?))
    }
    pub fn read_lp_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_7bit_len()?;
        let at = self.pos;
        let s = self.read_slice(len)?;
        std::str::from_utf8(s)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8 { pos: at })
    }
    pub fn read_slice(&mut self, len: usize) -> Result<&[u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(CodecError::Eof { pos: self.pos })?;
        let s = &self.data[self.pos..end];
        self.pos = end;
        Ok(s)
    }
    pub fn read_7bit_len(&mut self) -> Result<usize, CodecError> {
        let at = self.pos;
        let mut result: usize = 0;
        let mut shift = 0u32;
        loop {
            let b = self.read_u8()? as usize;
            result |= (b & 0x7F) << shift;
            if (b & 0x80) == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(CodecError::LengthOverflow { pos: at });
            }
        }
        Ok(result)
    }
}

/// Placeholder that decodes `data[body..end]` when first addressed.
fn lazy_container(data: Arc<[u8]>, rec: RecordType, body: usize, end: usize) -> Node {
    Node::lazy(Arc::new(move || {
        let mut parser = Parser {
            data: data.clone(),
            pos: body,
            opts: DecodeOpts::default(),
        };
        let node = parser.read_body(rec, 0).map_err(|e| e.to_string())?;
        if parser.pos != end {
            return Err(format!(
                "container body at {body:#x} declared {} bytes, used {}",
                end - body,
                parser.pos - body
            ));
        }
        Ok(node)
    }))
}
