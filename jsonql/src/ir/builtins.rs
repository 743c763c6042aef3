// Evaluation of the built-in function nodes

use crate::ir::{BinaryOp, Expr};
use crate::runtime::context::Context;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::Value;

/// `readConf(name, default?)`: the provider's entry for `name`, otherwise the
/// default (evaluated only then), otherwise null. Without a provider the name
/// is not evaluated at all.
pub fn read_conf(name: &Expr, default: Option<&Expr>, ctx: &mut Context) -> EvalResult<Value> {
    if ctx.config_provider().is_none() {
        log::debug!("readConf: no configuration provider, using default");
        return eval_default(default, ctx);
    }
    let key = name.eval(ctx)?;
    let key = key.as_str("readConf name")?;
    match ctx.config_provider().and_then(|p| p.lookup(key)) {
        Some(value) => Ok(Value::String(value)),
        None => eval_default(default, ctx),
    }
}

fn eval_default(default: Option<&Expr>, ctx: &mut Context) -> EvalResult<Value> {
    match default {
        Some(e) => e.eval(ctx),
        None => Ok(Value::Null),
    }
}

/// Number of elements in a sequence; null counts as empty.
pub fn count(input: &Expr, ctx: &mut Context) -> EvalResult<Value> {
    let mut iter = input.iter(ctx)?;
    let mut n: i64 = 0;
    while iter.advance(ctx)? {
        n += 1;
    }
    Ok(Value::Long(n))
}

/// Sum of the numbers in a sequence, skipping nulls. Empty sums to 0.
pub fn sum(input: &Expr, ctx: &mut Context) -> EvalResult<Value> {
    let mut iter = input.iter(ctx)?;
    let mut total = Value::Long(0);
    while iter.advance(ctx)? {
        match iter.current() {
            Value::Null => {}
            n @ (Value::Long(_) | Value::Double(_)) => total = BinaryOp::Add.apply(&total, n)?,
            other => return Err(EvalError::type_mismatch("number", other.type_name(), "sum")),
        }
    }
    Ok(total)
}

/// Append a value to the context's output for `target`.
pub fn write(target: &str, value: &Expr, ctx: &mut Context) -> EvalResult<Value> {
    let value = value.eval(ctx)?;
    ctx.write_output(target, value);
    Ok(Value::Null)
}
