//! String store: a plain keyed map of strings.
//!
//! ```text
//! get(key)         -> u8 present, then the value when present
//! set(key, value)  -> u8 1
//! ```

use super::wire::{put_str, WireReader};
use super::Structure;
use crate::error::ProtocolError;
use bytes::BufMut;
use std::collections::HashMap;

pub const OP_GET: u8 = 1;
pub const OP_SET: u8 = 2;

/// A decoded string operation, borrowing its strings from the request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp<'a> {
    Get { key: &'a str },
    Set { key: &'a str, value: &'a str },
}

impl<'a> StringOp<'a> {
    pub fn decode(reader: &mut WireReader<'a>) -> Result<Self, ProtocolError> {
        match reader.u8()? {
            OP_GET => Ok(StringOp::Get { key: reader.str()? }),
            OP_SET => Ok(StringOp::Set {
                key: reader.str()?,
                value: reader.str()?,
            }),
            other => Err(ProtocolError::UnknownOperation {
                structure: Structure::Strings as u8,
                operation: other,
            }),
        }
    }

    pub fn encode<B: BufMut>(&self, out: &mut B) {
        match *self {
            StringOp::Get { key } => {
                out.put_u8(OP_GET);
                put_str(out, key);
            }
            StringOp::Set { key, value } => {
                out.put_u8(OP_SET);
                put_str(out, key);
                put_str(out, value);
            }
        }
    }
}

/// Worker-local string map.
#[derive(Debug, Default)]
pub struct StringStore {
    strings: HashMap<String, String>,
}

impl StringStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute<B: BufMut>(&mut self, op: StringOp<'_>, out: &mut B) {
        match op {
            StringOp::Get { key } => match self.strings.get(key) {
                Some(value) => {
                    out.put_u8(1);
                    put_str(out, value);
                }
                None => out.put_u8(0),
            },
            StringOp::Set { key, value } => {
                // Overwrites reuse the existing allocation.
                match self.strings.get_mut(key) {
                    Some(existing) => {
                        existing.clear();
                        existing.push_str(value);
                    }
                    None => {
                        self.strings.insert(key.to_owned(), value.to_owned());
                    }
                }
                out.put_u8(1);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }
}
