//! Row values and their on-disk encoding (spec §6 "On-disk page format").
//!
//! `Int` encodes as 4-byte signed big-endian; `Varchar(n)` encodes as a
//! 2-byte big-endian length prefix followed by `n` zero-padded bytes of
//! UTF-8. This generalizes the big-endian int encoding this codebase has
//! always used (`Tuple::new` in `btree/tuple.rs`) to a second field type.

use std::fmt;

use crate::{
    error::{DbError, DbResult},
    field::{Field, Type},
    ids::RecordId,
    TupleDesc,
};

#[derive(Clone, Debug)]
pub struct Tuple {
    fields: Vec<Field>,
    /// Populated once the tuple has been placed in a page slot; `None` for
    /// a tuple still in flight to `insert_tuple`.
    pub record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            record_id: None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    /// Does this tuple's field sequence match the given schema's types?
    /// String variants are checked on type only (not declared capacity,
    /// which `encode`/`decode` enforce separately).
    pub fn matches_desc(&self, desc: &TupleDesc) -> bool {
        if self.fields.len() != desc.num_fields() {
            return false;
        }
        self.fields.iter().enumerate().all(|(i, field)| {
            matches!(
                (field, desc.field_type(i)),
                (Field::Int(_), Type::Int) | (Field::Varchar(_), Type::Varchar(_))
            )
        })
    }

    /// Encode this tuple's fields in declared order, per spec §6.
    pub fn encode(&self, desc: &TupleDesc) -> DbResult<Vec<u8>> {
        if !self.matches_desc(desc) {
            return Err(DbError::schema_mismatch(format!(
                "tuple {} does not match schema {}",
                self, desc
            )));
        }

        let mut bytes = Vec::with_capacity(desc.tuple_size());
        for (field, item) in self.fields.iter().zip(desc.fields()) {
            match (field, item.field_type) {
                (Field::Int(v), Type::Int) => bytes.extend_from_slice(&v.to_be_bytes()),
                (Field::Varchar(s), Type::Varchar(cap)) => {
                    let cap = cap as usize;
                    let payload = s.as_bytes();
                    if payload.len() > cap {
                        return Err(DbError::schema_mismatch(format!(
                            "varchar value {:?} exceeds capacity {}",
                            s, cap
                        )));
                    }
                    bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
                    bytes.extend_from_slice(payload);
                    bytes.resize(bytes.len() + (cap - payload.len()), 0);
                }
                _ => unreachable!("matches_desc already validated field/type pairing"),
            }
        }
        Ok(bytes)
    }

    /// Decode a tuple out of a slot's raw bytes.
    pub fn decode(desc: &TupleDesc, bytes: &[u8]) -> DbResult<Self> {
        if bytes.len() < desc.tuple_size() {
            return Err(DbError::io(format!(
                "slot has {} bytes, need {} for schema {}",
                bytes.len(),
                desc.tuple_size(),
                desc
            )));
        }

        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0usize;
        for item in desc.fields() {
            match item.field_type {
                Type::Int => {
                    let mut buf = [0u8; 4];
                    buf.copy_from_slice(&bytes[offset..offset + 4]);
                    fields.push(Field::Int(i32::from_be_bytes(buf)));
                    offset += 4;
                }
                Type::Varchar(cap) => {
                    let cap = cap as usize;
                    let mut len_buf = [0u8; 2];
                    len_buf.copy_from_slice(&bytes[offset..offset + 2]);
                    let len = u16::from_be_bytes(len_buf) as usize;
                    if len > cap {
                        return Err(DbError::io(format!(
                            "varchar length prefix {} exceeds capacity {}",
                            len, cap
                        )));
                    }
                    let payload = &bytes[offset + 2..offset + 2 + len];
                    let s = std::str::from_utf8(payload)
                        .map_err(|e| DbError::io(format!("invalid utf8 in varchar: {}", e)))?;
                    fields.push(Field::Varchar(s.to_string()));
                    offset += 2 + cap;
                }
            }
        }

        Ok(Self {
            fields,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|c| c.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}
