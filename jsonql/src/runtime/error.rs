// Error handling for the JSONQL runtime

use crate::config::ConfigError;
use crate::convert::ConversionError;

pub type EvalResult<T> = Result<T, EvalError>;

/// Failures raised while evaluating a single expression node.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// A value of the wrong variant reached an operation
    #[error("Type error in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        context: String,
    },

    #[error("Variable '{name}' is undefined")]
    UndefinedVariable { name: String },

    #[error("Arity mismatch calling {function}: expected {expected} arguments, got {actual}")]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    /// A node was evaluated without one of its required children
    #[error("Missing child {index} of {node}")]
    MissingChild { node: String, index: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Value is not callable: {actual}")]
    NotCallable { actual: String },

    #[error("Unknown function {name}/{arity}")]
    UnknownFunction { name: String, arity: usize },

    /// Spill buffer I/O or serialization failure
    #[error("Spill buffer error: {0}")]
    Spill(String),
}

impl EvalError {
    pub fn type_mismatch(expected: &str, actual: &str, context: &str) -> Self {
        EvalError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
            context: context.to_string(),
        }
    }
}

impl From<std::io::Error> for EvalError {
    fn from(e: std::io::Error) -> Self {
        EvalError::Spill(e.to_string())
    }
}

impl From<bincode::Error> for EvalError {
    fn from(e: bincode::Error) -> Self {
        EvalError::Spill(e.to_string())
    }
}

/// Errors reported at the statement-evaluation boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Evaluation(#[from] EvalError),

    /// A produced value does not conform to its statically inferred schema.
    #[error("Value {value} does not match schema {schema}")]
    SchemaConformance { value: String, schema: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_error_lifts_into_engine_error() {
        fn fails() -> Result<(), EngineError> {
            Err(EvalError::DivisionByZero)?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(EvalError::DivisionByZero)));
        assert_eq!(err.to_string(), "Division by zero");
    }

    #[test]
    fn type_mismatch_message_names_context() {
        let err = EvalError::type_mismatch("array", "long", "for");
        assert_eq!(err.to_string(), "Type error in for: expected array, got long");
    }
}
