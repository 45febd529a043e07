//! Tuple shape description (spec §3 "TupleDesc (external)").
//!
//! The core treats a [`TupleDesc`] as close to opaque -- it only ever needs
//! the fixed tuple byte size to lay out a [`crate::page::SlottedPage`]'s
//! slots. Two field types are implemented end-to-end (`Int`, `Varchar`) so
//! the thin operator layer has something real to scan and filter; this
//! generalizes the `Type`/`FieldItem` split used throughout this codebase
//! (`field.rs`, `storage/base/field.rs`) to more than one type.

use std::fmt;

/// A field's declared type and, for `Varchar`, its fixed on-disk capacity.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Type {
    Int,
    Varchar(u16),
}

impl Type {
    /// Size in bytes this type occupies inside a tuple's slot.
    pub fn len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Varchar(cap) => 2 + *cap as usize,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldItem {
    pub name: String,
    pub field_type: Type,
}

impl FieldItem {
    pub fn new(name: impl Into<String>, field_type: Type) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered sequence of (type, name) pairs describing a tuple's shape.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TupleDesc {
    fields: Vec<FieldItem>,
}

impl TupleDesc {
    pub fn new(fields: Vec<FieldItem>) -> Self {
        assert!(!fields.is_empty(), "a tuple desc needs at least one field");
        Self { fields }
    }

    /// Convenience constructor for an all-`Int` schema, matching the
    /// `simple_int_tuple_scheme` helper this codebase uses throughout its
    /// tests.
    pub fn all_ints(width: usize) -> Self {
        let fields = (0..width)
            .map(|i| FieldItem::new(format!("field_{}", i), Type::Int))
            .collect();
        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldItem] {
        &self.fields
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Fixed byte size of one tuple of this shape.
    pub fn tuple_size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.len()).sum()
    }

    pub fn field_type(&self, i: usize) -> Type {
        self.fields[i].field_type
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}:{:?}", field.name, field.field_type))
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// A single field's runtime value.
#[derive(Clone, PartialEq, Eq, Debug, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    Varchar(String),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Varchar(s) => write!(f, "{}", s),
        }
    }
}
