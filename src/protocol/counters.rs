//! Counter store: signed 64-bit counters keyed by 64-bit ids.
//!
//! ```text
//! get(id)                  -> i64   (0 for unknown ids)
//! set(id, value)           -> u8 1
//! increment(id, amount)    -> i64   (new value, wrapping)
//! cas(id, expected, new)   -> u8 1 on success, 0 on failure
//! ```
//!
//! `set`, `increment` and `cas` create missing keys at 0 before applying.

use super::wire::WireReader;
use super::Structure;
use crate::error::ProtocolError;
use bytes::BufMut;
use std::collections::HashMap;

pub const OP_GET: u8 = 1;
pub const OP_SET: u8 = 2;
pub const OP_INCREMENT: u8 = 3;
pub const OP_CAS: u8 = 4;

/// A decoded counter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOp {
    Get { id: i64 },
    Set { id: i64, value: i64 },
    Increment { id: i64, amount: i64 },
    Cas { id: i64, expected: i64, new: i64 },
}

impl CounterOp {
    /// Decode the operation code and its fields.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let operation = reader.u8()?;
        let op = match operation {
            OP_GET => CounterOp::Get { id: reader.i64()? },
            OP_SET => CounterOp::Set {
                id: reader.i64()?,
                value: reader.i64()?,
            },
            OP_INCREMENT => CounterOp::Increment {
                id: reader.i64()?,
                amount: reader.i64()?,
            },
            OP_CAS => CounterOp::Cas {
                id: reader.i64()?,
                expected: reader.i64()?,
                new: reader.i64()?,
            },
            other => {
                return Err(ProtocolError::UnknownOperation {
                    structure: Structure::Counters as u8,
                    operation: other,
                })
            }
        };
        Ok(op)
    }

    /// Encode the operation code and its fields (without the structure id).
    pub fn encode<B: BufMut>(&self, out: &mut B) {
        match *self {
            CounterOp::Get { id } => {
                out.put_u8(OP_GET);
                out.put_i64(id);
            }
            CounterOp::Set { id, value } => {
                out.put_u8(OP_SET);
                out.put_i64(id);
                out.put_i64(value);
            }
            CounterOp::Increment { id, amount } => {
                out.put_u8(OP_INCREMENT);
                out.put_i64(id);
                out.put_i64(amount);
            }
            CounterOp::Cas { id, expected, new } => {
                out.put_u8(OP_CAS);
                out.put_i64(id);
                out.put_i64(expected);
                out.put_i64(new);
            }
        }
    }
}

/// Worker-local counter map.
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: HashMap<i64, i64>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `op` and write its reply into `out`.
    pub fn execute<B: BufMut>(&mut self, op: CounterOp, out: &mut B) {
        match op {
            CounterOp::Get { id } => {
                out.put_i64(self.get(id));
            }
            CounterOp::Set { id, value } => {
                self.counters.insert(id, value);
                out.put_u8(1);
            }
            CounterOp::Increment { id, amount } => {
                let value = self.counters.entry(id).or_insert(0);
                *value = value.wrapping_add(amount);
                out.put_i64(*value);
            }
            CounterOp::Cas { id, expected, new } => {
                let value = self.counters.entry(id).or_insert(0);
                if *value == expected {
                    *value = new;
                    out.put_u8(1);
                } else {
                    out.put_u8(0);
                }
            }
        }
    }

    pub fn get(&self, id: i64) -> i64 {
        self.counters.get(&id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    fn run(store: &mut CounterStore, op: CounterOp) -> Vec<u8> {
        let mut out = Vec::new();
        store.execute(op, &mut out);
        out
    }

    fn run_i64(store: &mut CounterStore, op: CounterOp) -> i64 {
        run(store, op).as_slice().get_i64()
    }

    #[test]
    fn test_set_increment_get() {
        let mut store = CounterStore::new();
        assert_eq!(run(&mut store, CounterOp::Set { id: 1, value: 10 }), vec![1]);
        assert_eq!(run_i64(&mut store, CounterOp::Increment { id: 1, amount: 5 }), 15);
        assert_eq!(run_i64(&mut store, CounterOp::Get { id: 1 }), 15);
    }

    #[test]
    fn test_cas() {
        let mut store = CounterStore::new();
        store.execute(CounterOp::Set { id: 1, value: 15 }, &mut Vec::new());

        let cas = CounterOp::Cas { id: 1, expected: 15, new: 20 };
        assert_eq!(run(&mut store, cas), vec![1]);
        assert_eq!(store.get(1), 20);

        let cas = CounterOp::Cas { id: 1, expected: 999, new: 1 };
        assert_eq!(run(&mut store, cas), vec![0]);
        assert_eq!(store.get(1), 20);
    }

    #[test]
    fn test_unknown_id_reads_zero_without_creating() {
        let mut store = CounterStore::new();
        assert_eq!(run_i64(&mut store, CounterOp::Get { id: 42 }), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_first_use_creates_key() {
        let mut store = CounterStore::new();
        assert_eq!(run_i64(&mut store, CounterOp::Increment { id: 3, amount: -2 }), -2);
        assert_eq!(run(&mut store, CounterOp::Cas { id: 4, expected: 0, new: 9 }), vec![1]);
        assert_eq!(store.get(4), 9);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_increment_wraps() {
        let mut store = CounterStore::new();
        store.execute(CounterOp::Set { id: 1, value: i64::MAX }, &mut Vec::new());
        assert_eq!(run_i64(&mut store, CounterOp::Increment { id: 1, amount: 1 }), i64::MIN);
    }

    #[test]
    fn test_decode_matches_encode() {
        let ops = [
            CounterOp::Get { id: 1 },
            CounterOp::Set { id: 2, value: -3 },
            CounterOp::Increment { id: 4, amount: 5 },
            CounterOp::Cas { id: 6, expected: 7, new: 8 },
        ];
        for op in ops {
            let mut buf = Vec::new();
            op.encode(&mut buf);
            let mut reader = WireReader::new(&buf);
            assert_eq!(CounterOp::decode(&mut reader).unwrap(), op);
            assert!(reader.finish().is_ok());
        }
    }

    #[test]
    fn test_unknown_operation() {
        let mut reader = WireReader::new(&[9]);
        assert_eq!(
            CounterOp::decode(&mut reader),
            Err(ProtocolError::UnknownOperation {
                structure: 1,
                operation: 9
            })
        );
    }
}
