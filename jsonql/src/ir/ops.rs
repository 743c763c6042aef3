// Binary operators: arithmetic, comparison and three-valued logic

use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::Value;
use crate::schema::{Bool3, Schema, SchemaKind};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    /// Apply a non-logical operator to two evaluated operands. Logical
    /// operators short-circuit and are handled by the caller through
    /// [`to_bool3`] and [`BinaryOp::combine`].
    pub fn apply(&self, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
        match self {
            BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Null);
                }
                let ord = compare(lhs, rhs, self.symbol())?;
                Ok(Value::Bool(match self {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
            BinaryOp::And | BinaryOp::Or => {
                let l = to_bool3(lhs, self.symbol())?;
                let r = to_bool3(rhs, self.symbol())?;
                Ok(from_bool3(self.combine(l, r)))
            }
            _ => arithmetic(*self, lhs, rhs),
        }
    }

    pub fn combine(&self, lhs: Bool3, rhs: Bool3) -> Bool3 {
        match self {
            BinaryOp::Or => lhs.or(rhs),
            _ => lhs.and(rhs),
        }
    }

    /// Result schema given the operand schemas.
    pub fn schema(&self, lhs: &Schema, rhs: &Schema) -> Schema {
        let maybe_null = !lhs.is_null().never() || !rhs.is_null().never();
        match self {
            BinaryOp::Eq | BinaryOp::Ne => return Schema::Boolean,
            BinaryOp::And | BinaryOp::Or if maybe_null => {
                return Schema::Boolean.union(&Schema::Null)
            }
            BinaryOp::And | BinaryOp::Or => return Schema::Boolean,
            _ => {}
        }
        if lhs.is_null().always() || rhs.is_null().always() {
            return Schema::Null;
        }
        let base = match self {
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Schema::Boolean,
            BinaryOp::Add => {
                let (l, r) = (non_null(lhs), non_null(rhs));
                match (l.classify(), r.classify()) {
                    (SchemaKind::Number, SchemaKind::Number) => Schema::Number,
                    (SchemaKind::String, SchemaKind::String) => Schema::String,
                    (SchemaKind::Array, SchemaKind::Array) => Schema::array_of(
                        l.element_schema().union(&r.element_schema()),
                    ),
                    _ => Schema::Any,
                }
            }
            _ => {
                let (l, r) = (non_null(lhs), non_null(rhs));
                if l.classify() == SchemaKind::Number && r.classify() == SchemaKind::Number {
                    Schema::Number
                } else {
                    Schema::Any
                }
            }
        };
        if maybe_null {
            base.union(&Schema::Null)
        } else {
            base
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Null is UNKNOWN; any other non-boolean is a type error.
pub fn to_bool3(value: &Value, context: &str) -> EvalResult<Bool3> {
    match value {
        Value::Bool(b) => Ok(Bool3::from_bool(*b)),
        Value::Null => Ok(Bool3::Unknown),
        other => Err(EvalError::type_mismatch("boolean", other.type_name(), context)),
    }
}

pub fn from_bool3(b: Bool3) -> Value {
    b.to_option().map_or(Value::Null, Value::Bool)
}

fn non_null(schema: &Schema) -> Schema {
    match schema {
        Schema::Union(variants) => {
            let mut rest: Vec<Schema> = variants
                .iter()
                .filter(|s| !matches!(s, Schema::Null))
                .cloned()
                .collect();
            if rest.len() == 1 {
                rest.remove(0)
            } else {
                Schema::Union(rest)
            }
        }
        other => other.clone(),
    }
}

fn compare(lhs: &Value, rhs: &Value, op: &str) -> EvalResult<Ordering> {
    match (lhs, rhs) {
        (Value::Long(a), Value::Long(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| {
                EvalError::type_mismatch("comparable numbers", "NaN", op)
            }),
            _ => Err(EvalError::type_mismatch(
                lhs.type_name(),
                rhs.type_name(),
                op,
            )),
        },
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    match (lhs, rhs) {
        (Value::Long(a), Value::Long(b)) => long_arithmetic(op, *a, *b),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (Value::Array(_) | Value::Spilled(_), Value::Array(_) | Value::Spilled(_))
            if op == BinaryOp::Add =>
        {
            let mut items = lhs.to_elements()?.unwrap_or_default();
            items.extend(rhs.to_elements()?.unwrap_or_default());
            Ok(Value::Array(items))
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => double_arithmetic(op, a, b),
            (None, _) => Err(EvalError::type_mismatch("number", lhs.type_name(), op.symbol())),
            (_, None) => Err(EvalError::type_mismatch("number", rhs.type_name(), op.symbol())),
        },
    }
}

// Overflow falls back to double arithmetic.
fn long_arithmetic(op: BinaryOp, a: i64, b: i64) -> EvalResult<Value> {
    let exact = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                _ => None,
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Some(a.checked_rem(b).unwrap_or(0))
        }
        _ => None,
    };
    match exact {
        Some(n) => Ok(Value::Long(n)),
        None => double_arithmetic(op, a as f64, b as f64),
    }
}

fn double_arithmetic(op: BinaryOp, a: f64, b: f64) -> EvalResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        other => {
            return Err(EvalError::type_mismatch(
                "arithmetic operator",
                other.symbol(),
                "binary expression",
            ))
        }
    };
    Ok(Value::Double(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_division_is_exact_or_double() {
        assert_eq!(BinaryOp::Div.apply(&Value::Long(6), &Value::Long(3)), Ok(Value::Long(2)));
        assert_eq!(BinaryOp::Div.apply(&Value::Long(7), &Value::Long(2)), Ok(Value::Double(3.5)));
        assert_eq!(
            BinaryOp::Mod.apply(&Value::Long(7), &Value::Long(0)),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn overflow_falls_back_to_double() {
        let v = BinaryOp::Add.apply(&Value::Long(i64::MAX), &Value::Long(1)).unwrap();
        assert!(matches!(v, Value::Double(_)));
    }

    #[test]
    fn null_propagates_through_arithmetic_and_ordering() {
        assert_eq!(BinaryOp::Add.apply(&Value::Null, &Value::Long(1)), Ok(Value::Null));
        assert_eq!(BinaryOp::Lt.apply(&Value::Long(1), &Value::Null), Ok(Value::Null));
        assert_eq!(BinaryOp::Eq.apply(&Value::Null, &Value::Null), Ok(Value::Bool(true)));
    }

    #[test]
    fn concatenation() {
        assert_eq!(
            BinaryOp::Add.apply(&Value::string("ab"), &Value::string("c")),
            Ok(Value::string("abc"))
        );
        assert_eq!(
            BinaryOp::Add.apply(
                &Value::Array(vec![Value::Long(1)]),
                &Value::Array(vec![Value::Long(2)])
            ),
            Ok(Value::Array(vec![Value::Long(1), Value::Long(2)]))
        );
    }

    #[test]
    fn ordering_rejects_mixed_kinds() {
        assert!(BinaryOp::Lt.apply(&Value::string("a"), &Value::Long(1)).is_err());
        assert_eq!(BinaryOp::Ge.apply(&Value::Long(2), &Value::Double(1.5)), Ok(Value::Bool(true)));
    }

    #[test]
    fn logical_operators_are_three_valued() {
        assert_eq!(BinaryOp::And.apply(&Value::Bool(false), &Value::Null), Ok(Value::Bool(false)));
        assert_eq!(BinaryOp::And.apply(&Value::Bool(true), &Value::Null), Ok(Value::Null));
        assert_eq!(BinaryOp::Or.apply(&Value::Bool(true), &Value::Null), Ok(Value::Bool(true)));
    }

    #[test]
    fn arithmetic_schema_tracks_nullability() {
        assert_eq!(BinaryOp::Add.schema(&Schema::Number, &Schema::Number), Schema::Number);
        let s = BinaryOp::Add.schema(&Schema::Number, &Schema::Any);
        assert!(s.matches(&Value::Null));
        assert!(s.matches(&Value::Long(1)));
        assert_eq!(BinaryOp::Mul.schema(&Schema::Null, &Schema::Number), Schema::Null);
    }
}
