// Standard rewrite rules

use crate::ir::function::classify_usage;
use crate::ir::{BindingExpr, BindingKind, Expr};
use crate::rewrite::{RewriteEnv, RewriteRule};
use crate::runtime::context::Context;
use crate::runtime::values::Value;
use crate::runtime::var::{Var, VarMap, VarUsage};
use std::rc::Rc;

pub fn standard_rules() -> Vec<Box<dyn RewriteRule>> {
    vec![
        Box::new(ConstantFold),
        Box::new(NullCheck),
        Box::new(DeadIf),
        Box::new(InlineCall),
        Box::new(UnusedBinding),
        Box::new(InlineBinding),
        Box::new(FlattenDo),
    ]
}

/// Evaluate operators whose operands are all constants.
pub struct ConstantFold;

impl RewriteRule for ConstantFold {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn rewrite(&self, expr: &mut Expr, _env: &RewriteEnv) -> bool {
        let foldable = matches!(
            expr,
            Expr::Binary { .. } | Expr::Not(_) | Expr::IsNull(_) | Expr::Array(_) | Expr::Record(_)
        ) && expr.children().into_iter().all(Expr::is_const);
        if !foldable {
            return false;
        }
        let mut scratch = Context::new();
        match expr.eval(&mut scratch) {
            Ok(value) if value.has_literal_form() => {
                *expr = Expr::Const(value);
                true
            }
            _ => false,
        }
    }
}

/// `isnull(e)` where the schema of `e` settles the answer.
pub struct NullCheck;

impl RewriteRule for NullCheck {
    fn name(&self) -> &'static str {
        "null-check"
    }

    fn rewrite(&self, expr: &mut Expr, _env: &RewriteEnv) -> bool {
        let Expr::IsNull(inner) = expr else {
            return false;
        };
        if inner.is_const() || !inner.is_pure() {
            return false;
        }
        match inner.schema().is_null().to_option() {
            Some(answer) => {
                *expr = Expr::Const(Value::Bool(answer));
                true
            }
            None => false,
        }
    }
}

/// `if` with a constant test becomes the branch it selects.
pub struct DeadIf;

impl RewriteRule for DeadIf {
    fn name(&self) -> &'static str {
        "dead-if"
    }

    fn rewrite(&self, expr: &mut Expr, _env: &RewriteEnv) -> bool {
        let take_then = match expr {
            Expr::If { test, .. } => match test.as_ref() {
                Expr::Const(Value::Bool(b)) => *b,
                Expr::Const(Value::Null) => false,
                _ => return false,
            },
            _ => return false,
        };
        if let Expr::If {
            then, otherwise, ..
        } = std::mem::replace(expr, Expr::null())
        {
            *expr = if take_then {
                *then
            } else {
                otherwise.map_or_else(Expr::null, |e| *e)
            };
        }
        true
    }
}

/// Calling a literal function becomes its body, with each parameter bound
/// to its argument.
pub struct InlineCall;

impl RewriteRule for InlineCall {
    fn name(&self) -> &'static str {
        "inline-call"
    }

    fn rewrite(&self, expr: &mut Expr, _env: &RewriteEnv) -> bool {
        let Expr::Call { func, args } = expr else {
            return false;
        };
        let def = match func.as_ref() {
            Expr::Function(def) => Rc::clone(def),
            Expr::Const(Value::Function(f)) => f.shared_definition(),
            _ => return false,
        };
        if def.num_params() != args.len() {
            return false;
        }
        let (params, body) = def.clone_with(&mut VarMap::new()).into_parts();
        let mut block: Vec<Expr> = params
            .into_iter()
            .zip(std::mem::take(args))
            .map(|(param, arg)| Expr::Binding(BindingExpr::eq(param.var, arg)))
            .collect();
        block.push(body);
        *expr = Expr::Do(block);
        true
    }
}

// `x = e` with a single defining child, where `e` has no effects.
fn pure_definition(expr: &Expr) -> Option<(&Var, &Expr)> {
    match expr {
        Expr::Binding(b)
            if b.kind == BindingKind::Eq && b.var2.is_none() && b.exprs.len() == 1 =>
        {
            let value = &b.exprs[0];
            value.is_pure().then_some((&b.var, value))
        }
        _ => None,
    }
}

/// Drop `do` bindings nothing reads.
pub struct UnusedBinding;

impl RewriteRule for UnusedBinding {
    fn name(&self) -> &'static str {
        "unused-binding"
    }

    fn rewrite(&self, expr: &mut Expr, _env: &RewriteEnv) -> bool {
        let Expr::Do(elems) = expr else {
            return false;
        };
        let before = elems.len();
        let mut i = 0;
        while i + 1 < elems.len() {
            let unused = pure_definition(&elems[i]).map_or(false, |(var, _)| {
                classify_usage(var, &elems[i + 1..]) == VarUsage::Unused
            });
            if unused {
                elems.remove(i);
            } else {
                i += 1;
            }
        }
        elems.len() != before
    }
}

/// Substitute a `do` binding into its uses when its value is a constant, or
/// when the variable is read exactly once on a path evaluated once.
pub struct InlineBinding;

impl RewriteRule for InlineBinding {
    fn name(&self) -> &'static str {
        "inline-binding"
    }

    fn rewrite(&self, expr: &mut Expr, _env: &RewriteEnv) -> bool {
        let Expr::Do(elems) = expr else {
            return false;
        };
        for i in 0..elems.len().saturating_sub(1) {
            let Some((var, value)) = pure_definition(&elems[i]) else {
                continue;
            };
            let rest = &elems[i + 1..];
            let usage = classify_usage(var, rest);
            let inline = match usage {
                VarUsage::Unused => false,
                _ if value.is_const() => true,
                VarUsage::Stream => {
                    let free = value.free_vars();
                    !rest.iter().any(|e| match e {
                        Expr::Binding(b) => b.bound_vars().any(|v| free.contains(v)),
                        _ => false,
                    })
                }
                VarUsage::Eval => false,
            };
            if !inline {
                continue;
            }
            let var = var.clone();
            let replacement = match elems.remove(i) {
                Expr::Binding(mut b) => b.exprs.pop(),
                _ => None,
            };
            if let Some(replacement) = replacement {
                for e in elems[i..].iter_mut() {
                    e.substitute(&var, &replacement);
                }
            }
            return true;
        }
        false
    }
}

/// Collapse trivial and nested `do` blocks.
pub struct FlattenDo;

impl RewriteRule for FlattenDo {
    fn name(&self) -> &'static str {
        "flatten-do"
    }

    fn rewrite(&self, expr: &mut Expr, _env: &RewriteEnv) -> bool {
        let Expr::Do(elems) = expr else {
            return false;
        };
        match elems.as_slice() {
            [] => {
                *expr = Expr::null();
                return true;
            }
            [only] if !matches!(only, Expr::Binding(_)) => {
                if let Some(only) = elems.pop() {
                    *expr = only;
                }
                return true;
            }
            _ => {}
        }
        if matches!(elems.last(), Some(Expr::Do(inner)) if !inner.is_empty()) {
            if let Some(Expr::Do(inner)) = elems.pop() {
                elems.extend(inner);
            }
            return true;
        }
        false
    }
}
