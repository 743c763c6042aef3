// JSONQL Library
// Expression IR, schema inference, evaluation and rewriting for a JSON-native query language
pub mod config;
pub mod convert;
pub mod ir;
pub mod rewrite;
pub mod runtime;
pub mod schema;
pub mod script;

// Re-export the pieces callers need to build, rewrite and run expression trees.
pub use config::{ConfigError, ConfigProvider, EngineConfig, MapConfigProvider};
pub use convert::{ConversionError, HostRecord, RecordConverter};
pub use ir::{BinaryOp, BindingExpr, BindingKind, DefineFunction, Expr, SplitClause, SplitExpr};
pub use rewrite::{RewriteEngine, RewriteEnv, RewriteStats};
pub use runtime::{Context, EngineError, EvalError, EvalResult, Value, Var, VarMap, VarUsage};
pub use schema::{Bool3, Schema};
pub use script::{PassResults, QueryParser, ScriptReport, ScriptRunner};
