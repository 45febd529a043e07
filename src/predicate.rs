//! Equality/range predicates for the optional scan filter (spec §4.7).
//!
//! Generalizes the teacher's `Op`/`Predicate` pair (`operator.rs`,
//! `predicate.rs`), which only ever compared an `IntCell`, to compare any
//! [`Field`] value -- there is still no expression evaluation beyond a
//! single `field op value` comparison, matching the base spec's explicit
//! non-goal of a query optimizer or general expression language.

use std::fmt;

use crate::{field::Field, tuple::Tuple};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
}

/// `tuple.field(field_index) <op> value`.
#[derive(Clone, Debug)]
pub struct Predicate {
    pub field_index: usize,
    pub op: Op,
    pub value: Field,
}

impl Predicate {
    pub fn new(field_index: usize, op: Op, value: Field) -> Self {
        Self {
            field_index,
            op,
            value,
        }
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        let field = tuple.field(self.field_index);
        match self.op {
            Op::Equals => field == &self.value,
            Op::NotEquals => field != &self.value,
            Op::GreaterThan => field > &self.value,
            Op::GreaterThanOrEq => field >= &self.value,
            Op::LessThan => field < &self.value,
            Op::LessThanOrEq => field <= &self.value,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field[{}] {:?} {}", self.field_index, self.op, self.value)
    }
}
