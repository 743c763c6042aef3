// Static registry of built-in function names
//
// Maps a surface name to its accepted arity range and a constructor that
// builds the corresponding node. Built once on first use.

use crate::ir::Expr;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::Value;
use indexmap::IndexMap;
use lazy_static::lazy_static;

pub type Constructor = fn(Vec<Expr>) -> EvalResult<Expr>;

#[derive(Debug, Clone, Copy)]
pub struct FunctionEntry {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub constructor: Constructor,
}

impl FunctionEntry {
    pub fn accepts(&self, arity: usize) -> bool {
        (self.min_args..=self.max_args).contains(&arity)
    }

    fn expected(&self) -> String {
        if self.min_args == self.max_args {
            self.min_args.to_string()
        } else {
            format!("{}..={}", self.min_args, self.max_args)
        }
    }
}

lazy_static! {
    static ref BUILTINS: IndexMap<&'static str, FunctionEntry> = [
        entry("readConf", 1, 2, make_read_conf),
        entry("count", 1, 1, |args| Ok(Expr::Count(Box::new(single(args, "count")?)))),
        entry("sum", 1, 1, |args| Ok(Expr::Sum(Box::new(single(args, "sum")?)))),
        entry("write", 2, 2, make_write),
        entry("randomLong", 1, 1, |args| {
            let key = const_string(&single(args, "randomLong")?, "randomLong key")?;
            Ok(Expr::RandomLong { key })
        }),
        entry("isnull", 1, 1, |args| Ok(Expr::IsNull(Box::new(single(args, "isnull")?)))),
    ]
    .into_iter()
    .collect();
}

fn entry(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    constructor: Constructor,
) -> (&'static str, FunctionEntry) {
    (
        name,
        FunctionEntry {
            name,
            min_args,
            max_args,
            constructor,
        },
    )
}

pub fn lookup(name: &str) -> Option<&'static FunctionEntry> {
    BUILTINS.get(name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.keys().copied()
}

/// Build the node for `name(args...)`.
pub fn make_call(name: &str, args: Vec<Expr>) -> EvalResult<Expr> {
    let entry = lookup(name).ok_or_else(|| EvalError::UnknownFunction {
        name: name.to_string(),
        arity: args.len(),
    })?;
    if !entry.accepts(args.len()) {
        return Err(EvalError::ArityMismatch {
            function: name.to_string(),
            expected: entry.expected(),
            actual: args.len(),
        });
    }
    (entry.constructor)(args)
}

fn single(args: Vec<Expr>, name: &str) -> EvalResult<Expr> {
    args.into_iter().next().ok_or_else(|| EvalError::MissingChild {
        node: name.to_string(),
        index: 0,
    })
}

fn const_string(expr: &Expr, context: &str) -> EvalResult<String> {
    match expr {
        Expr::Const(Value::String(s)) => Ok(s.clone()),
        Expr::Const(other) => Err(EvalError::type_mismatch("string", other.type_name(), context)),
        other => Err(EvalError::type_mismatch("string literal", other.node_name(), context)),
    }
}

fn make_read_conf(args: Vec<Expr>) -> EvalResult<Expr> {
    let mut args = args.into_iter();
    let name = args.next().ok_or_else(|| EvalError::MissingChild {
        node: "readConf".to_string(),
        index: 0,
    })?;
    Ok(Expr::ReadConf {
        name: Box::new(name),
        default: args.next().map(Box::new),
    })
}

fn make_write(args: Vec<Expr>) -> EvalResult<Expr> {
    let mut args = args.into_iter();
    let (Some(target), Some(value)) = (args.next(), args.next()) else {
        return Err(EvalError::MissingChild {
            node: "write".to_string(),
            index: 1,
        });
    };
    Ok(Expr::Write {
        target: const_string(&target, "write target")?,
        value: Box::new(value),
    })
}
