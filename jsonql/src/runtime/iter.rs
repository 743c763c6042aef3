// Pull-based value sequences

use crate::runtime::context::Context;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::Value;

/// A lazily produced sequence of values.
///
/// `advance` moves to the next value and reports whether one exists;
/// `current` returns it. Once `advance` has returned `false` it keeps
/// returning `false`. `advance` may run arbitrary nested evaluation.
pub trait JsonIter {
    fn advance(&mut self, ctx: &mut Context) -> EvalResult<bool>;

    fn current(&self) -> &Value;
}

pub type BoxedIter<'a> = Box<dyn JsonIter + 'a>;

/// Drain an iterator into a vector.
pub fn collect(iter: &mut dyn JsonIter, ctx: &mut Context) -> EvalResult<Vec<Value>> {
    let mut out = Vec::new();
    while iter.advance(ctx)? {
        out.push(iter.current().clone());
    }
    Ok(out)
}

/// Iterate an already computed value: arrays yield their elements, null
/// yields nothing, anything else is a type error.
pub fn iter_value<'a>(value: Value, context: &str) -> EvalResult<BoxedIter<'a>> {
    match value {
        Value::Null => Ok(Box::new(EmptyIter::default())),
        Value::Array(items) => Ok(Box::new(ValuesIter::new(items))),
        Value::Spilled(spilled) => Ok(Box::new(spilled.iter())),
        other => Err(EvalError::type_mismatch("array", other.type_name(), context)),
    }
}

#[derive(Debug, Default)]
pub struct EmptyIter {
    current: Value,
}

impl JsonIter for EmptyIter {
    fn advance(&mut self, _ctx: &mut Context) -> EvalResult<bool> {
        Ok(false)
    }

    fn current(&self) -> &Value {
        &self.current
    }
}

/// Iterator over owned, in-memory values.
#[derive(Debug)]
pub struct ValuesIter {
    items: std::vec::IntoIter<Value>,
    current: Value,
    done: bool,
}

impl ValuesIter {
    pub fn new(items: Vec<Value>) -> Self {
        ValuesIter {
            items: items.into_iter(),
            current: Value::Null,
            done: false,
        }
    }
}

impl JsonIter for ValuesIter {
    fn advance(&mut self, _ctx: &mut Context) -> EvalResult<bool> {
        if self.done {
            return Ok(false);
        }
        match self.items.next() {
            Some(v) => {
                self.current = v;
                Ok(true)
            }
            None => {
                self.done = true;
                self.current = Value::Null;
                Ok(false)
            }
        }
    }

    fn current(&self) -> &Value {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_iter_stays_exhausted() {
        let mut ctx = Context::new();
        let mut it = ValuesIter::new(vec![Value::Long(1)]);
        assert!(it.advance(&mut ctx).unwrap());
        assert_eq!(it.current(), &Value::Long(1));
        assert!(!it.advance(&mut ctx).unwrap());
        assert!(!it.advance(&mut ctx).unwrap());
    }

    #[test]
    fn iter_value_rejects_scalars() {
        assert!(iter_value(Value::Long(3), "test").is_err());
        let mut ctx = Context::new();
        let mut empty = iter_value(Value::Null, "test").unwrap();
        assert!(!empty.advance(&mut ctx).unwrap());
    }
}
