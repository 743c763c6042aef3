//! Approximate static types ("schemas") over the JSON value domain.
//!
//! A schema describes the set of values an expression may produce. The
//! `is_*` predicates are conservative and answer in [`Bool3`]; `matches` is an
//! exact runtime check used to assert that inference was sound.
//!
//! `merge` follows per-variant rules and returns `None` when a variant does
//! not know how to absorb the other operand. It only consults the receiver's
//! rule: `Null.merge(Any)` is `None` even though `Any.merge(Null)` is `Any`.
//! [`Schema::union`] falls back to an explicit union in that case, so the
//! resulting schema accepts the same values in either order even though its
//! shape depends on operand order.

pub mod bool3;

pub use bool3::Bool3;

use crate::runtime::values::{write_json_string, Value};
use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Record,
    Function,
    Any,
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Null,
    Boolean,
    Number,
    String,
    /// Arrays of `element`; `length` is known for arrays built from a fixed
    /// number of element expressions.
    Array {
        element: Box<Schema>,
        length: Option<usize>,
    },
    /// Records carrying at least `fields`; `open` records may carry more.
    Record {
        fields: IndexMap<String, Schema>,
        open: bool,
    },
    Function,
    Any,
    Union(Vec<Schema>),
}

impl Schema {
    pub fn array_of(element: Schema) -> Schema {
        Schema::Array {
            element: Box::new(element),
            length: None,
        }
    }

    pub fn empty_array() -> Schema {
        Schema::Array {
            element: Box::new(Schema::Any),
            length: Some(0),
        }
    }

    pub fn classify(&self) -> SchemaKind {
        match self {
            Schema::Null => SchemaKind::Null,
            Schema::Boolean => SchemaKind::Boolean,
            Schema::Number => SchemaKind::Number,
            Schema::String => SchemaKind::String,
            Schema::Array { .. } => SchemaKind::Array,
            Schema::Record { .. } => SchemaKind::Record,
            Schema::Function => SchemaKind::Function,
            Schema::Any => SchemaKind::Any,
            Schema::Union(_) => SchemaKind::Union,
        }
    }

    /// Exact schema of a concrete value.
    pub fn of(value: &Value) -> Schema {
        match value {
            Value::Null => Schema::Null,
            Value::Bool(_) => Schema::Boolean,
            Value::Long(_) | Value::Double(_) => Schema::Number,
            Value::String(_) => Schema::String,
            Value::Array(items) => {
                let element = items
                    .iter()
                    .map(Schema::of)
                    .reduce(|acc, s| acc.union(&s))
                    .unwrap_or(Schema::Any);
                Schema::Array {
                    element: Box::new(element),
                    length: Some(items.len()),
                }
            }
            Value::Spilled(spilled) => Schema::Array {
                element: Box::new(Schema::Any),
                length: Some(spilled.len()),
            },
            Value::Record(fields) => Schema::Record {
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Schema::of(v)))
                    .collect(),
                open: false,
            },
            Value::Function(_) => Schema::Function,
        }
    }

    pub fn is_null(&self) -> Bool3 {
        match self {
            Schema::Null => Bool3::True,
            Schema::Any => Bool3::Unknown,
            Schema::Union(variants) => fold_variants(variants, Schema::is_null),
            _ => Bool3::False,
        }
    }

    pub fn is_array_or_null(&self) -> Bool3 {
        match self {
            Schema::Null | Schema::Array { .. } => Bool3::True,
            Schema::Any => Bool3::Unknown,
            Schema::Union(variants) => fold_variants(variants, Schema::is_array_or_null),
            _ => Bool3::False,
        }
    }

    pub fn is_empty_array_or_null(&self) -> Bool3 {
        match self {
            Schema::Null => Bool3::True,
            Schema::Array { length: Some(0), .. } => Bool3::True,
            Schema::Array { length: Some(_), .. } => Bool3::False,
            Schema::Array { length: None, .. } | Schema::Any => Bool3::Unknown,
            Schema::Union(variants) => fold_variants(variants, Schema::is_empty_array_or_null),
            _ => Bool3::False,
        }
    }

    /// TRUE when the schema admits exactly one value.
    pub fn is_constant(&self) -> Bool3 {
        match self {
            Schema::Null => Bool3::True,
            Schema::Array { length: Some(0), .. } => Bool3::True,
            Schema::Record { fields, open: false } if fields.is_empty() => Bool3::True,
            Schema::Any => Bool3::Unknown,
            Schema::Union(variants) if variants.len() == 1 => variants[0].is_constant(),
            Schema::Union(variants) => {
                if variants.iter().all(|v| v.is_constant().never()) {
                    Bool3::False
                } else {
                    Bool3::Unknown
                }
            }
            _ => Bool3::False,
        }
    }

    /// Exact conformance check of a runtime value.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Schema::Any, _) => true,
            (Schema::Union(variants), v) => variants.iter().any(|s| s.matches(v)),
            (Schema::Null, Value::Null) => true,
            (Schema::Boolean, Value::Bool(_)) => true,
            (Schema::Number, Value::Long(_) | Value::Double(_)) => true,
            (Schema::String, Value::String(_)) => true,
            (Schema::Function, Value::Function(_)) => true,
            (Schema::Array { element, length }, Value::Array(items)) => {
                length.map_or(true, |n| n == items.len()) && items.iter().all(|v| element.matches(v))
            }
            (Schema::Array { element, length }, Value::Spilled(spilled)) => {
                match spilled.to_vec() {
                    Ok(items) => {
                        length.map_or(true, |n| n == items.len())
                            && items.iter().all(|v| element.matches(v))
                    }
                    Err(_) => false,
                }
            }
            (Schema::Record { fields, open }, Value::Record(actual)) => {
                let declared_ok = fields
                    .iter()
                    .all(|(k, s)| actual.get(k).map_or(false, |v| s.matches(v)));
                declared_ok && (*open || actual.keys().all(|k| fields.contains_key(k)))
            }
            _ => false,
        }
    }

    /// Merge `other` into this schema under this variant's rule, or `None`
    /// when the two cannot be described by a single variant.
    pub fn merge(&self, other: &Schema) -> Option<Schema> {
        match self {
            Schema::Null => match other {
                Schema::Null => Some(Schema::Null),
                _ => None,
            },
            Schema::Boolean | Schema::Number | Schema::String | Schema::Function => {
                if self.classify() == other.classify() {
                    Some(self.clone())
                } else {
                    None
                }
            }
            Schema::Array { element, length } => match other {
                Schema::Array {
                    element: other_element,
                    length: other_length,
                } => Some(Schema::Array {
                    element: Box::new(merge_elements(element, other_element, *length, *other_length)),
                    length: if length == other_length { *length } else { None },
                }),
                _ => None,
            },
            Schema::Record { fields, open } => match other {
                Schema::Record {
                    fields: other_fields,
                    open: other_open,
                } if same_keys(fields, other_fields) => Some(Schema::Record {
                    fields: fields
                        .iter()
                        .map(|(k, s)| (k.clone(), s.union(&other_fields[k])))
                        .collect(),
                    open: *open || *other_open,
                }),
                _ => None,
            },
            Schema::Any => Some(Schema::Any),
            Schema::Union(variants) => {
                let mut merged = variants.clone();
                push_variant(&mut merged, other);
                Some(Schema::Union(merged))
            }
        }
    }

    /// Schema of values produced by either operand.
    pub fn union(&self, other: &Schema) -> Schema {
        if let Some(merged) = self.merge(other) {
            return merged;
        }
        let mut variants = Vec::new();
        push_variant(&mut variants, self);
        push_variant(&mut variants, other);
        if variants.len() == 1 {
            variants.remove(0)
        } else {
            Schema::Union(variants)
        }
    }

    /// Schema of the elements produced when iterating a value of this schema.
    pub fn element_schema(&self) -> Schema {
        match self {
            Schema::Array { element, .. } => (**element).clone(),
            Schema::Union(variants) => variants
                .iter()
                .filter(|v| matches!(v, Schema::Array { .. } | Schema::Any))
                .map(Schema::element_schema)
                .reduce(|acc, s| acc.union(&s))
                .unwrap_or(Schema::Any),
            _ => Schema::Any,
        }
    }
}

fn fold_variants(variants: &[Schema], pred: fn(&Schema) -> Bool3) -> Bool3 {
    let mut answers = variants.iter().map(pred);
    match answers.next() {
        None => Bool3::Unknown,
        Some(first) => answers.fold(first, |acc, b| if acc == b { acc } else { Bool3::Unknown }),
    }
}

fn same_keys(a: &IndexMap<String, Schema>, b: &IndexMap<String, Schema>) -> bool {
    a.len() == b.len() && a.keys().all(|k| b.contains_key(k))
}

// An empty array's element schema carries no information.
fn merge_elements(a: &Schema, b: &Schema, a_len: Option<usize>, b_len: Option<usize>) -> Schema {
    match (a_len, b_len) {
        (Some(0), _) => b.clone(),
        (_, Some(0)) => a.clone(),
        _ => a.union(b),
    }
}

fn push_variant(variants: &mut Vec<Schema>, schema: &Schema) {
    if let Schema::Union(inner) = schema {
        for s in inner {
            push_variant(variants, s);
        }
        return;
    }
    for existing in variants.iter_mut() {
        if let Some(merged) = existing.merge(schema) {
            *existing = merged;
            return;
        }
    }
    variants.push(schema.clone());
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Null => write!(f, "null"),
            Schema::Boolean => write!(f, "boolean"),
            Schema::Number => write!(f, "number"),
            Schema::String => write!(f, "string"),
            Schema::Function => write!(f, "function"),
            Schema::Any => write!(f, "any"),
            Schema::Array { element, length } => match length {
                Some(n) => write!(f, "[{} * {}]", element, n),
                None => write!(f, "[{} ...]", element),
            },
            Schema::Record { fields, open } => {
                write!(f, "{{")?;
                for (i, (k, s)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_json_string(f, k)?;
                    write!(f, ": {}", s)?;
                }
                if *open {
                    write!(f, "{}*", if fields.is_empty() { "" } else { ", " })?;
                }
                write!(f, "}}")
            }
            Schema::Union(variants) => {
                for (i, v) in variants.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}
