// Runtime value system for JSONQL
// Represents values during evaluation (different from the IR, which represents queries)

use crate::ir::function::DefineFunction;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::spill::SpilledArray;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Record(IndexMap<String, Value>),
    Function(FunctionValue),
    /// An array whose elements were buffered through a spill file.
    Spilled(SpilledArray),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) | Value::Spilled(_) => "array",
            Value::Record(_) => "record",
            Value::Function(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    /// Effective boolean value of a test expression result.
    pub fn ebv(&self, context: &str) -> EvalResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            other => Err(EvalError::type_mismatch("boolean", other.type_name(), context)),
        }
    }

    pub fn as_str(&self, context: &str) -> EvalResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(EvalError::type_mismatch("string", other.type_name(), context)),
        }
    }

    pub fn as_function(&self, context: &str) -> EvalResult<&FunctionValue> {
        match self {
            Value::Function(f) => Ok(f),
            other => Err(EvalError::NotCallable {
                actual: format!("{} in {}", other.type_name(), context),
            }),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// False when the value holds a non-finite double, which has no literal
    /// form in the surface syntax.
    pub fn has_literal_form(&self) -> bool {
        match self {
            Value::Double(d) => d.is_finite(),
            Value::Array(items) => items.iter().all(Value::has_literal_form),
            Value::Record(fields) => fields.values().all(Value::has_literal_form),
            _ => true,
        }
    }

    /// Elements of an array value, reading spilled arrays back into memory.
    pub fn to_elements(&self) -> EvalResult<Option<Vec<Value>>> {
        match self {
            Value::Array(items) => Ok(Some(items.clone())),
            Value::Spilled(spilled) => spilled.to_vec().map(Some),
            _ => Ok(None),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Long(a), Value::Double(b)) | (Value::Double(b), Value::Long(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Spilled(_), _) | (_, Value::Spilled(_)) => {
                match (self.to_elements(), other.to_elements()) {
                    (Ok(Some(a)), Ok(Some(b))) => a == b,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Long(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{:?}", d),
            Value::String(s) => write_json_string(f, s),
            Value::Array(items) => write_array(f, items),
            Value::Spilled(spilled) => match spilled.to_vec() {
                Ok(items) => write_array(f, &items),
                Err(_) => write!(f, "[...]"),
            },
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_json_string(f, k)?;
                    write!(f, ": {}", v)?;
                }
                write!(f, "}}")
            }
            Value::Function(_) => write!(f, "#<function>"),
        }
    }
}

fn write_array(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}

pub(crate) fn write_json_string(f: &mut impl fmt::Write, s: &str) -> fmt::Result {
    match serde_json::to_string(s) {
        Ok(quoted) => f.write_str(&quoted),
        Err(_) => write!(f, "\"{}\"", s),
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// A first-class function: a definition plus whether it carries a snapshot of
/// captured variables.
#[derive(Clone)]
pub struct FunctionValue {
    def: Rc<DefineFunction>,
    has_captures: bool,
}

impl FunctionValue {
    pub fn new(def: Rc<DefineFunction>, has_captures: bool) -> Self {
        FunctionValue { def, has_captures }
    }

    pub fn definition(&self) -> &DefineFunction {
        &self.def
    }

    pub fn shared_definition(&self) -> Rc<DefineFunction> {
        Rc::clone(&self.def)
    }

    pub fn has_captures(&self) -> bool {
        self.has_captures
    }

    pub fn arity(&self) -> usize {
        self.def.num_params()
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("arity", &self.arity())
            .field("has_captures", &self.has_captures)
            .finish()
    }
}

impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.def, &other.def)
    }
}
