// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compact binary encoding of document trees.
//!
//! bincode is not self-describing, so the tree is flattened into a stream of
//! tagged tokens in pre-order and prefixed with a magic header. Containers
//! carry their length and are rebuilt with an explicit stack, so hostile
//! input can not recurse past [`MAX_DEPTH`].

use super::DocumentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

const MAGIC: &[u8; 4] = b"SGB1";

/// Deepest container nesting accepted when decoding
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Token {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Followed by this many values
    Array(u64),
    /// Followed by this many key/value pairs, keys as `String` tokens
    Object(u64),
}

enum Pending<'a> {
    Value(&'a Value),
    Key(&'a str),
}

fn flatten(doc: &Value) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pending = vec![Pending::Value(doc)];
    while let Some(next) = pending.pop() {
        let value = match next {
            Pending::Key(key) => {
                tokens.push(Token::String(key.to_string()));
                continue;
            }
            Pending::Value(value) => value,
        };
        match value {
            Value::Null => tokens.push(Token::Null),
            Value::Bool(b) => tokens.push(Token::Bool(*b)),
            Value::Number(n) => tokens.push(if let Some(u) = n.as_u64() {
                Token::UInt(u)
            } else if let Some(i) = n.as_i64() {
                Token::Int(i)
            } else {
                Token::Float(n.as_f64().unwrap_or(f64::NAN))
            }),
            Value::String(s) => tokens.push(Token::String(s.clone())),
            Value::Array(items) => {
                tokens.push(Token::Array(items.len() as u64));
                pending.extend(items.iter().rev().map(Pending::Value));
            }
            Value::Object(obj) => {
                tokens.push(Token::Object(obj.len() as u64));
                for (key, value) in obj.iter().rev() {
                    pending.push(Pending::Value(value));
                    pending.push(Pending::Key(key));
                }
            }
        }
    }
    tokens
}

enum Frame {
    Array {
        items: Vec<Value>,
        remaining: u64,
    },
    Object {
        entries: Map<String, Value>,
        key: Option<String>,
        remaining: u64,
    },
}

fn malformed(message: &str) -> DocumentError {
    DocumentError::Malformed(format!("binary document: {}", message))
}

fn rebuild(tokens: Vec<Token>) -> Result<Value, DocumentError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        if let Some(Frame::Object { key, .. }) = stack.last_mut() {
            if key.is_none() {
                match token {
                    Token::String(k) => *key = Some(k),
                    _ => return Err(malformed("object key is not a string")),
                }
                continue;
            }
        }

        let mut value = match token {
            Token::Null => Value::Null,
            Token::Bool(b) => Value::Bool(b),
            Token::Int(i) => Value::Number(i.into()),
            Token::UInt(u) => Value::Number(u.into()),
            // Non-finite floats have no JSON representation
            Token::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            Token::String(s) => Value::String(s),
            Token::Array(0) => Value::Array(Vec::new()),
            Token::Object(0) => Value::Object(Map::new()),
            Token::Array(len) | Token::Object(len) if stack.len() >= MAX_DEPTH => {
                return Err(malformed(&format!(
                    "nesting deeper than {} ({} pending entries)",
                    MAX_DEPTH, len
                )));
            }
            Token::Array(remaining) => {
                stack.push(Frame::Array {
                    items: Vec::new(),
                    remaining,
                });
                continue;
            }
            Token::Object(remaining) => {
                stack.push(Frame::Object {
                    entries: Map::new(),
                    key: None,
                    remaining,
                });
                continue;
            }
        };

        // Hand the finished value to its parent, closing every container
        // that becomes full on the way up
        loop {
            let Some(mut frame) = stack.pop() else {
                return match tokens.next() {
                    None => Ok(value),
                    Some(_) => Err(malformed("trailing data after the root value")),
                };
            };
            let full = match &mut frame {
                Frame::Array { items, remaining } => {
                    items.push(value);
                    *remaining -= 1;
                    *remaining == 0
                }
                Frame::Object {
                    entries,
                    key,
                    remaining,
                } => {
                    entries.insert(key.take().unwrap_or_default(), value);
                    *remaining -= 1;
                    *remaining == 0
                }
            };
            if !full {
                stack.push(frame);
                break;
            }
            value = match frame {
                Frame::Array { items, .. } => Value::Array(items),
                Frame::Object { entries, .. } => Value::Object(entries),
            };
        }
    }

    Err(malformed("unexpected end of data"))
}

pub(super) fn encode(doc: &Value) -> Result<Vec<u8>, DocumentError> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend(bincode::serialize(&flatten(doc))?);
    Ok(bytes)
}

pub(super) fn decode(bytes: &[u8]) -> Result<Value, DocumentError> {
    let payload = bytes
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| DocumentError::Unsupported("missing binary document header".to_string()))?;
    let tokens: Vec<Token> = bincode::deserialize(payload)?;
    rebuild(tokens)
}
