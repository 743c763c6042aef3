//! JSONQL Runtime
//!
//! Values, variable slots, the pull-based iterator protocol and the
//! execution context every node evaluates against.

pub mod context;
pub mod error;
pub mod iter;
pub mod rng;
pub mod spill;
pub mod values;
pub mod var;

pub use context::Context;
pub use error::{EngineError, EvalError, EvalResult};
pub use iter::{BoxedIter, JsonIter};
pub use rng::{RngSnapshot, RngStore};
pub use spill::{SpillBuffer, SpillSettings, SpilledArray};
pub use values::{FunctionValue, Value};
pub use var::{Var, VarMap, VarUsage};
