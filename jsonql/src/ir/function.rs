// Function definitions, closure conversion and invocation

use crate::ir::binding::BindingExpr;
use crate::ir::Expr;
use crate::runtime::context::Context;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::{FunctionValue, Value};
use crate::runtime::var::{Var, VarMap, VarUsage};
use indexmap::IndexSet;
use itertools::Itertools;
use std::fmt::{self, Write};
use std::rc::Rc;

/// `fn(params) ( body )`. Each parameter is a childless binding.
#[derive(Debug, Clone)]
pub struct DefineFunction {
    params: Vec<BindingExpr>,
    body: Expr,
}

impl DefineFunction {
    pub fn new(params: Vec<Var>, body: Expr) -> Self {
        DefineFunction {
            params: params.into_iter().map(BindingExpr::param).collect(),
            body,
        }
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn param(&self, index: usize) -> Option<&BindingExpr> {
        self.params.get(index)
    }

    pub fn params(&self) -> &[BindingExpr] {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Expr {
        &mut self.body
    }

    pub fn into_parts(self) -> (Vec<BindingExpr>, Expr) {
        (self.params, self.body)
    }

    pub fn decompile(&self, out: &mut String, captured: &mut IndexSet<Var>) -> fmt::Result {
        out.write_str("fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            out.write_str(param.var.name())?;
        }
        out.write_str(") ( ")?;
        self.body.decompile(out, captured)?;
        out.write_str(" )")?;
        for param in &self.params {
            captured.shift_remove(&param.var);
        }
        Ok(())
    }

    /// Variables the body references that are bound neither by the
    /// parameters nor inside the body, in first-reference order.
    pub fn captured_vars(&self) -> IndexSet<Var> {
        let mut text = String::new();
        let mut captured = IndexSet::new();
        // Writing to a String cannot fail.
        let _ = self.decompile(&mut text, &mut captured);
        captured
    }

    /// True when the function captures nothing and can be shared as is.
    pub fn is_constant(&self) -> bool {
        self.captured_vars().is_empty()
    }

    /// Classify how the body uses each parameter.
    pub fn annotate(&self) {
        for param in &self.params {
            param.var.set_usage(classify_usage(&param.var, [&self.body]));
        }
    }

    /// Turn this definition into a function value. Free variables are
    /// snapshotted: each gets a private copy holding its current value,
    /// bound ahead of a clone of the body that refers to the copies.
    pub fn eval_to_closure(self: &Rc<Self>, _ctx: &mut Context) -> EvalResult<Value> {
        self.annotate();
        let captured = self.captured_vars();
        if captured.is_empty() {
            return Ok(Value::Function(FunctionValue::new(Rc::clone(self), false)));
        }

        let mut map = VarMap::fresh_for(&captured);
        let mut bindings = Vec::with_capacity(captured.len() + 1);
        for old in &captured {
            let value = old.value()?;
            let new = map.remap_ref(old);
            bindings.push(Expr::Binding(BindingExpr::eq(new, Expr::Const(value))));
        }
        let (params, body) = self.clone_with(&mut map).into_parts();
        bindings.push(body);
        let closure = DefineFunction {
            params,
            body: Expr::Do(bindings),
        };
        closure.annotate();
        log::debug!(
            "closure over {} captured variable(s): {}",
            captured.len(),
            captured.iter().map(Var::name).join(", ")
        );
        Ok(Value::Function(FunctionValue::new(Rc::new(closure), true)))
    }

    pub fn clone_with(&self, map: &mut VarMap) -> DefineFunction {
        let params = self.params.iter().map(|p| p.clone_with(map)).collect();
        DefineFunction {
            params,
            body: self.body.clone_with(map),
        }
    }
}

/// Classify the references to `var` under `roots`, each of which is
/// evaluated once by its owner.
///
/// `Stream` needs exactly one reference reached only through children that
/// are evaluated once; any other non-zero count is `Eval`.
pub fn classify_usage<'a>(var: &Var, roots: impl IntoIterator<Item = &'a Expr>) -> VarUsage {
    let mut uses = Vec::new();
    for root in roots {
        root.var_uses(var, true, &mut uses);
    }
    match uses.as_slice() {
        [] => VarUsage::Unused,
        [true] => VarUsage::Stream,
        _ => VarUsage::Eval,
    }
}

impl FunctionValue {
    /// Call with positional arguments. Parameter slots and every slot bound
    /// inside the body are restored afterwards, so nested and recursive
    /// activations do not see each other's values.
    pub fn invoke(&self, args: Vec<Value>, ctx: &mut Context) -> EvalResult<Value> {
        let def = self.definition();
        if args.len() != def.num_params() {
            return Err(EvalError::ArityMismatch {
                function: format!("fn/{}", def.num_params()),
                expected: def.num_params().to_string(),
                actual: args.len(),
            });
        }
        let mut locals = IndexSet::new();
        def.body.collect_binders(&mut locals);
        for param in &def.params {
            locals.shift_remove(&param.var);
        }
        let saved_locals: Vec<(Var, Option<Value>)> = locals
            .into_iter()
            .map(|var| {
                let old = var.replace(None);
                (var, old)
            })
            .collect();
        let saved: Vec<Option<Value>> = def
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| param.var.replace(Some(arg)))
            .collect();
        let result = def.body.eval(ctx);
        for (param, old) in def.params.iter().zip(saved) {
            param.var.replace(old);
        }
        for (var, old) in saved_locals {
            var.replace(old);
        }
        result
    }
}
