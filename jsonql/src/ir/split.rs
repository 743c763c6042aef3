// Fan-out: route each element of one sequence to the first matching sink

use crate::ir::binding::BindingExpr;
use crate::ir::{decompile_source, Expr};
use crate::runtime::context::Context;
use crate::runtime::error::EvalResult;
use crate::runtime::spill::SpillBuffer;
use crate::runtime::values::Value;
use crate::runtime::var::{Var, VarMap};
use crate::schema::Bool3;
use indexmap::IndexSet;
use std::fmt::{self, Write};

/// `if( test ) ( sink )` inside a split. `sink` evaluates to a one-argument
/// function.
#[derive(Debug, Clone)]
pub struct SplitClause {
    pub test: Expr,
    pub sink: Expr,
}

impl SplitClause {
    pub fn new(test: Expr, sink: Expr) -> Self {
        SplitClause { test, sink }
    }
}

/// `source -> split each x if( t1 ) ( f1 ) if( t2 ) ( f2 ) ...`
///
/// The whole input is buffered first. An element goes to the first clause
/// whose test holds and to no other; elements matching nothing are dropped.
/// Each sink is then called once, in clause order, with its complete buffer.
#[derive(Debug, Clone)]
pub struct SplitExpr {
    binding: BindingExpr,
    clauses: Vec<SplitClause>,
}

impl SplitExpr {
    pub fn new(binding: BindingExpr, clauses: Vec<SplitClause>) -> Self {
        SplitExpr { binding, clauses }
    }

    pub fn binding(&self) -> &BindingExpr {
        &self.binding
    }

    pub fn clauses(&self) -> &[SplitClause] {
        &self.clauses
    }

    pub fn eval(&self, ctx: &mut Context) -> EvalResult<Value> {
        let var = &self.binding.var;
        let mut buffers: Vec<SpillBuffer> = self
            .clauses
            .iter()
            .map(|_| SpillBuffer::new(ctx.spill_settings().clone()))
            .collect();

        let mut input = self.binding.source()?.iter(ctx)?;
        while input.advance(ctx)? {
            let item = input.current().clone();
            var.set_value(item.clone());
            for (clause, buffer) in self.clauses.iter().zip(buffers.iter_mut()) {
                if clause.test.eval(ctx)?.ebv("split")? {
                    buffer.push(item)?;
                    break;
                }
            }
        }
        var.undefine();

        let finished = buffers
            .into_iter()
            .map(SpillBuffer::finish)
            .collect::<EvalResult<Vec<_>>>()?;
        for (i, (clause, items)) in self.clauses.iter().zip(finished).enumerate() {
            let sink = clause.sink.eval(ctx)?;
            let sink = sink.as_function("split sink")?;
            log::debug!(
                "split on {}: clause {} receives {} value(s)",
                var.name(),
                i,
                items.len()
            );
            sink.invoke(vec![Value::Spilled(items)], ctx)?;
        }
        Ok(Value::Null)
    }

    /// Binding children, then test and sink per clause.
    pub fn children(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = self.binding.exprs.iter().collect();
        for clause in &self.clauses {
            out.push(&clause.test);
            out.push(&clause.sink);
        }
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        let mut out: Vec<&mut Expr> = self.binding.exprs.iter_mut().collect();
        for clause in self.clauses.iter_mut() {
            out.push(&mut clause.test);
            out.push(&mut clause.sink);
        }
        out
    }

    /// The source and each sink are evaluated once; tests run per element.
    pub fn evaluates_child_once(&self, index: usize) -> Bool3 {
        let sources = self.binding.exprs.len();
        if index < sources {
            Bool3::True
        } else {
            Bool3::from_bool((index - sources) % 2 == 1)
        }
    }

    pub fn decompile(&self, out: &mut String, captured: &mut IndexSet<Var>) -> fmt::Result {
        decompile_source(&self.binding, out, captured)?;
        write!(out, "\n-> split each {}", self.binding.var.name())?;
        for clause in &self.clauses {
            out.write_str(" if( ")?;
            clause.test.decompile(out, captured)?;
            out.write_str(" ) ( ")?;
            clause.sink.decompile(out, captured)?;
            out.write_str(" )\n")?;
        }
        captured.shift_remove(&self.binding.var);
        Ok(())
    }

    pub fn clone_with(&self, map: &mut VarMap) -> SplitExpr {
        let binding = self.binding.clone_with(map);
        let clauses = self
            .clauses
            .iter()
            .map(|c| SplitClause {
                test: c.test.clone_with(map),
                sink: c.sink.clone_with(map),
            })
            .collect();
        SplitExpr { binding, clauses }
    }
}
