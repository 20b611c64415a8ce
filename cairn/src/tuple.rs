//! Tuples and their schema descriptors.
//!
//! On-disk field encoding: integers are big-endian signed 32-bit; strings are
//! a 32-bit big-endian length prefix followed by a fixed-capacity payload
//! padded with zeros.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{DbError, DbResult};
use crate::PageId;

/// Fixed payload capacity of a string field, in bytes.
pub const STRING_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Str,
}

impl FieldType {
    /// On-disk size of a field of this type.
    pub fn byte_len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str => 4 + STRING_CAPACITY,
        }
    }
}

/// Comparison operators applied by predicates, field against constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Equals,
    GreaterThan,
    LessThan,
    GreaterThanOrEq,
    LessThanOrEq,
    NotEquals,
    /// Substring match; strings only.
    Like,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Str(_) => FieldType::Str,
        }
    }

    /// Evaluates `self op other`. Fields of mismatched types never compare
    /// equal; ordered comparisons between mismatched types are false.
    pub fn compare(&self, op: CmpOp, other: &Field) -> bool {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => match op {
                CmpOp::Equals => a == b,
                CmpOp::GreaterThan => a > b,
                CmpOp::LessThan => a < b,
                CmpOp::GreaterThanOrEq => a >= b,
                CmpOp::LessThanOrEq => a <= b,
                CmpOp::NotEquals => a != b,
                CmpOp::Like => a == b,
            },
            (Field::Str(a), Field::Str(b)) => match op {
                CmpOp::Equals => a == b,
                CmpOp::GreaterThan => a > b,
                CmpOp::LessThan => a < b,
                CmpOp::GreaterThanOrEq => a >= b,
                CmpOp::LessThanOrEq => a <= b,
                CmpOp::NotEquals => a != b,
                CmpOp::Like => a.contains(b.as_str()),
            },
            _ => matches!(op, CmpOp::NotEquals),
        }
    }

    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> DbResult<()> {
        match self {
            Field::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            Field::Str(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > STRING_CAPACITY {
                    return Err(DbError::InvalidArgument(format!(
                        "string of {} bytes exceeds field capacity {}",
                        bytes.len(),
                        STRING_CAPACITY
                    )));
                }
                buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(bytes);
                buf.extend(std::iter::repeat(0u8).take(STRING_CAPACITY - bytes.len()));
            }
        }
        Ok(())
    }

    /// Decodes one field of the given type from `bytes`, which must hold at
    /// least `ty.byte_len()` bytes.
    pub fn read_from(ty: FieldType, bytes: &[u8]) -> DbResult<Field> {
        if bytes.len() < ty.byte_len() {
            return Err(DbError::InvalidArgument(format!(
                "field of type {:?} needs {} bytes, got {}",
                ty,
                ty.byte_len(),
                bytes.len()
            )));
        }
        match ty {
            FieldType::Int => {
                let raw: [u8; 4] = bytes[..4].try_into().expect("length checked");
                Ok(Field::Int(i32::from_be_bytes(raw)))
            }
            FieldType::Str => {
                let raw: [u8; 4] = bytes[..4].try_into().expect("length checked");
                let len = u32::from_be_bytes(raw) as usize;
                if len > STRING_CAPACITY {
                    return Err(DbError::InvalidArgument(format!(
                        "string length prefix {} exceeds capacity {}",
                        len, STRING_CAPACITY
                    )));
                }
                let payload = &bytes[4..4 + len];
                let s = std::str::from_utf8(payload).map_err(|e| {
                    DbError::InvalidArgument(format!("string field is not utf-8: {e}"))
                })?;
                Ok(Field::Str(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::Str(s) => write!(f, "{s}"),
        }
    }
}

/// One entry of a schema: a field type and an optional column name.
#[derive(Debug, Clone)]
pub struct TdItem {
    pub field_type: FieldType,
    pub name: Option<String>,
}

/// The schema of a tuple: an ordered list of typed, optionally named fields.
///
/// Equality considers field types only; two descriptors that differ just in
/// column names (e.g. an alias-prefixed scan schema) describe the same layout.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(items: Vec<TdItem>) -> Self {
        Self { items }
    }

    /// Builds a descriptor from types alone, leaving fields unnamed.
    pub fn of(types: &[FieldType]) -> Self {
        Self {
            items: types
                .iter()
                .map(|&field_type| TdItem {
                    field_type,
                    name: None,
                })
                .collect(),
        }
    }

    /// Builds a descriptor from parallel type and name slices.
    pub fn with_names(types: &[FieldType], names: &[&str]) -> Self {
        Self {
            items: types
                .iter()
                .zip(names.iter())
                .map(|(&field_type, name)| TdItem {
                    field_type,
                    name: Some((*name).to_string()),
                })
                .collect(),
        }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Option<FieldType> {
        self.items.get(i).map(|item| item.field_type)
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.items.get(i).and_then(|item| item.name.as_deref())
    }

    /// Index of the field with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(name))
    }

    pub fn items(&self) -> &[TdItem] {
        &self.items
    }

    /// On-disk size of one tuple of this schema.
    pub fn byte_size(&self) -> usize {
        self.items
            .iter()
            .map(|item| item.field_type.byte_len())
            .sum()
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(other.items.iter())
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for TupleDesc {}

/// The address of a tuple: the page holding it and the slot index within
/// that page. Stable only while the tuple occupies the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// A fixed-schema record. Tuples loaded from a page carry the record id of
/// the slot they came from.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: Arc<TupleDesc>, fields: Vec<Field>) -> DbResult<Self> {
        if fields.len() != desc.num_fields() {
            return Err(DbError::InvalidArgument(format!(
                "tuple has {} fields, schema expects {}",
                fields.len(),
                desc.num_fields()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            if Some(field.field_type()) != desc.field_type(i) {
                return Err(DbError::InvalidArgument(format!(
                    "field {} has type {:?}, schema expects {:?}",
                    i,
                    field.field_type(),
                    desc.field_type(i)
                )));
            }
        }
        Ok(Self {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    pub fn serialize(&self) -> DbResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.desc.byte_size());
        for field in &self.fields {
            field.serialize_into(&mut buf)?;
        }
        Ok(buf)
    }

    /// Decodes a tuple of the given schema from `bytes`.
    pub fn from_bytes(desc: Arc<TupleDesc>, bytes: &[u8]) -> DbResult<Tuple> {
        if bytes.len() < desc.byte_size() {
            return Err(DbError::InvalidArgument(format!(
                "tuple needs {} bytes, got {}",
                desc.byte_size(),
                bytes.len()
            )));
        }
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for item in desc.items() {
            fields.push(Field::read_from(item.field_type, &bytes[offset..])?);
            offset += item.field_type.byte_len();
        }
        Tuple::new(desc, fields)
    }
}

// Tuple identity is its field values; the record id is an address, not data.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", rendered.join(", "))
    }
}
