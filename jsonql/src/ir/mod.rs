//! Expression IR
//!
//! [`Expr`] is a closed set of node kinds. Every node supports the same
//! contract: eager evaluation ([`Expr::eval`]), lazy iteration
//! ([`Expr::iter`]), structural schema inference, decompilation to surface
//! syntax, capture-safe cloning through a [`VarMap`], and an evaluation
//! cardinality hint per child used by usage analysis.
//!
//! Children are addressed by index in a fixed order per kind; see
//! [`Expr::children`].

pub mod binding;
pub mod builtins;
pub mod function;
pub mod ops;
pub mod registry;
pub mod split;

pub use binding::{BindingExpr, BindingKind};
pub use function::DefineFunction;
pub use ops::BinaryOp;
pub use split::{SplitClause, SplitExpr};

use crate::runtime::context::Context;
use crate::runtime::error::EvalResult;
use crate::runtime::iter::{iter_value, BoxedIter, EmptyIter, JsonIter, ValuesIter};
use crate::runtime::values::{write_json_string, Value};
use crate::runtime::var::{Var, VarMap};
use crate::schema::{Bool3, Schema, SchemaKind};
use indexmap::{IndexMap, IndexSet};
use std::fmt::{self, Write};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Expr {
    Const(Value),
    Var(Var),
    Array(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    If {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// Leading bindings scope over the remaining elements; the last element
    /// is the result.
    Do(Vec<Expr>),
    /// Evaluates `body` once per element bound by `binding`. Array results
    /// are concatenated, null results skipped, anything else appended.
    For {
        binding: BindingExpr,
        body: Box<Expr>,
    },
    Binding(BindingExpr),
    Function(Rc<DefineFunction>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Split(SplitExpr),
    ReadConf {
        name: Box<Expr>,
        default: Option<Box<Expr>>,
    },
    Count(Box<Expr>),
    Sum(Box<Expr>),
    Write {
        target: String,
        value: Box<Expr>,
    },
    RandomLong {
        key: String,
    },
}

impl Expr {
    pub fn null() -> Expr {
        Expr::Const(Value::Null)
    }

    pub fn long(n: i64) -> Expr {
        Expr::Const(Value::Long(n))
    }

    pub fn string(s: &str) -> Expr {
        Expr::Const(Value::string(s))
    }

    pub fn var(var: &Var) -> Expr {
        Expr::Var(var.clone())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn if_else(test: Expr, then: Expr, otherwise: Option<Expr>) -> Expr {
        Expr::If {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        }
    }

    pub fn for_each(binding: BindingExpr, body: Expr) -> Expr {
        Expr::For {
            binding,
            body: Box::new(body),
        }
    }

    pub fn function(params: Vec<Var>, body: Expr) -> Expr {
        Expr::Function(Rc::new(DefineFunction::new(params, body)))
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            func: Box::new(func),
            args,
        }
    }

    pub fn let_in(var: &Var, value: Expr, body: Expr) -> Expr {
        Expr::Do(vec![Expr::Binding(BindingExpr::eq(var.clone(), value)), body])
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Const(_))
    }

    /// Short kind name used in diagnostics.
    pub fn node_name(&self) -> &'static str {
        match self {
            Expr::Const(_) => "const",
            Expr::Var(_) => "var",
            Expr::Array(_) => "array",
            Expr::Record(_) => "record",
            Expr::Binary { .. } => "binary",
            Expr::Not(_) => "not",
            Expr::IsNull(_) => "isnull",
            Expr::If { .. } => "if",
            Expr::Do(_) => "do",
            Expr::For { .. } => "for",
            Expr::Binding(_) => "binding",
            Expr::Function(_) => "fn",
            Expr::Call { .. } => "call",
            Expr::Split(_) => "split",
            Expr::ReadConf { .. } => "readConf",
            Expr::Count(_) => "count",
            Expr::Sum(_) => "sum",
            Expr::Write { .. } => "write",
            Expr::RandomLong { .. } => "randomLong",
        }
    }

    pub fn eval(&self, ctx: &mut Context) -> EvalResult<Value> {
        match self {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Var(var) => var.value(),
            Expr::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|e| e.eval(ctx))
                    .collect::<EvalResult<_>>()?,
            )),
            Expr::Record(fields) => {
                let mut record = IndexMap::with_capacity(fields.len());
                for (name, e) in fields {
                    record.insert(name.clone(), e.eval(ctx)?);
                }
                Ok(Value::Record(record))
            }
            Expr::Binary { op, lhs, rhs } if op.is_logical() => {
                let l = ops::to_bool3(&lhs.eval(ctx)?, op.symbol())?;
                match (op, l) {
                    (BinaryOp::And, Bool3::False) => return Ok(Value::Bool(false)),
                    (BinaryOp::Or, Bool3::True) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let r = ops::to_bool3(&rhs.eval(ctx)?, op.symbol())?;
                Ok(ops::from_bool3(op.combine(l, r)))
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(ctx)?;
                let r = rhs.eval(ctx)?;
                op.apply(&l, &r)
            }
            Expr::Not(e) => Ok(ops::from_bool3(!ops::to_bool3(&e.eval(ctx)?, "not")?)),
            Expr::IsNull(e) => Ok(Value::Bool(e.eval(ctx)?.is_null())),
            Expr::If {
                test,
                then,
                otherwise,
            } => {
                if test.eval(ctx)?.ebv("if")? {
                    then.eval(ctx)
                } else {
                    match otherwise {
                        Some(e) => e.eval(ctx),
                        None => Ok(Value::Null),
                    }
                }
            }
            Expr::Do(exprs) => {
                let mut result = Value::Null;
                for e in exprs {
                    result = e.eval(ctx)?;
                }
                Ok(result)
            }
            Expr::For { binding, body } => {
                let mut out = Vec::new();
                let mut source = binding.iter(ctx)?;
                while source.advance(ctx)? {
                    match body.eval(ctx)? {
                        Value::Null => {}
                        Value::Array(items) => out.extend(items),
                        Value::Spilled(spilled) => out.extend(spilled.to_vec()?),
                        other => out.push(other),
                    }
                }
                Ok(Value::Array(out))
            }
            Expr::Binding(binding) => binding.eval(ctx),
            Expr::Function(def) => def.eval_to_closure(ctx),
            Expr::Call { func, args } => {
                let callee = func.eval(ctx)?;
                let function = callee.as_function("call")?;
                let args = args
                    .iter()
                    .map(|e| e.eval(ctx))
                    .collect::<EvalResult<Vec<_>>>()?;
                function.invoke(args, ctx)
            }
            Expr::Split(split) => split.eval(ctx),
            Expr::ReadConf { name, default } => builtins::read_conf(name, default.as_deref(), ctx),
            Expr::Count(e) => builtins::count(e, ctx),
            Expr::Sum(e) => builtins::sum(e, ctx),
            Expr::Write { target, value } => builtins::write(target, value, ctx),
            Expr::RandomLong { key } => Ok(Value::Long(ctx.rngs_mut().next_long(key))),
        }
    }

    /// Produce the value of this node as a lazy sequence. Binding, `for`,
    /// `do` and `if` nodes stream; everything else is evaluated and its
    /// array result iterated.
    pub fn iter<'a>(&'a self, ctx: &mut Context) -> EvalResult<BoxedIter<'a>> {
        match self {
            Expr::Binding(binding) => binding.iter(ctx),
            Expr::For { binding, body } => Ok(Box::new(ForIter {
                source: binding.iter(ctx)?,
                body,
                inner: None,
                current: Value::Null,
            })),
            Expr::Do(exprs) => match exprs.split_last() {
                None => Ok(Box::new(EmptyIter::default())),
                Some((last, init)) => {
                    for e in init {
                        e.eval(ctx)?;
                    }
                    last.iter(ctx)
                }
            },
            Expr::If {
                test,
                then,
                otherwise,
            } => {
                if test.eval(ctx)?.ebv("if")? {
                    then.iter(ctx)
                } else {
                    match otherwise {
                        Some(e) => e.iter(ctx),
                        None => Ok(Box::new(EmptyIter::default())),
                    }
                }
            }
            other => iter_value(other.eval(ctx)?, other.node_name()),
        }
    }

    /// Static schema of the value `eval` produces.
    pub fn schema(&self) -> Schema {
        match self {
            Expr::Const(value) => Schema::of(value),
            Expr::Var(var) => var.schema(),
            Expr::Array(items) => match items
                .iter()
                .map(Expr::schema)
                .reduce(|acc, s| acc.union(&s))
            {
                Some(element) => Schema::Array {
                    element: Box::new(element),
                    length: Some(items.len()),
                },
                None => Schema::empty_array(),
            },
            Expr::Record(fields) => Schema::Record {
                fields: fields.iter().map(|(k, e)| (k.clone(), e.schema())).collect(),
                open: false,
            },
            Expr::Binary { op, lhs, rhs } => op.schema(&lhs.schema(), &rhs.schema()),
            Expr::Not(e) => {
                if e.schema().is_null().never() {
                    Schema::Boolean
                } else {
                    Schema::Boolean.union(&Schema::Null)
                }
            }
            Expr::IsNull(_) => Schema::Boolean,
            Expr::If {
                then, otherwise, ..
            } => {
                let other = otherwise.as_ref().map_or(Schema::Null, |e| e.schema());
                then.schema().union(&other)
            }
            Expr::Do(exprs) => exprs.last().map_or(Schema::Null, |e| e.schema()),
            Expr::For { body, .. } => {
                let body = body.schema();
                let element = match body.classify() {
                    SchemaKind::Array => body.element_schema(),
                    SchemaKind::Null | SchemaKind::Any | SchemaKind::Union => Schema::Any,
                    _ => body,
                };
                Schema::array_of(element)
            }
            Expr::Binding(_) | Expr::Split(_) | Expr::Write { .. } => Schema::Null,
            Expr::Function(_) => Schema::Function,
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Function(def) => def.body().schema(),
                _ => Schema::Any,
            },
            Expr::ReadConf { default, .. } => {
                let fallback = default.as_ref().map_or(Schema::Null, |e| e.schema());
                Schema::String.union(&fallback)
            }
            Expr::Count(_) | Expr::Sum(_) | Expr::RandomLong { .. } => Schema::Number,
        }
    }

    /// Children in index order.
    ///
    /// `For` and `Split` list their binding's children first; `Split` then
    /// lists each clause as test followed by sink.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_) | Expr::Var(_) | Expr::RandomLong { .. } => Vec::new(),
            Expr::Array(items) | Expr::Do(items) => items.iter().collect(),
            Expr::Record(fields) => fields.iter().map(|(_, e)| e).collect(),
            Expr::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Expr::Not(e) | Expr::IsNull(e) | Expr::Count(e) | Expr::Sum(e) => vec![e.as_ref()],
            Expr::Write { value, .. } => vec![value.as_ref()],
            Expr::If {
                test,
                then,
                otherwise,
            } => {
                let mut out = vec![test.as_ref(), then.as_ref()];
                out.extend(otherwise.as_deref());
                out
            }
            Expr::For { binding, body } => {
                let mut out: Vec<&Expr> = binding.exprs.iter().collect();
                out.push(body);
                out
            }
            Expr::Binding(binding) => binding.exprs.iter().collect(),
            Expr::Function(def) => vec![def.body()],
            Expr::Call { func, args } => {
                let mut out = vec![func.as_ref()];
                out.extend(args.iter());
                out
            }
            Expr::Split(split) => split.children(),
            Expr::ReadConf { name, default } => {
                let mut out = vec![name.as_ref()];
                out.extend(default.as_deref());
                out
            }
        }
    }

    /// Mutable children, in the same order as [`Expr::children`]. Function
    /// bodies shared with closures are copied on write.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Const(_) | Expr::Var(_) | Expr::RandomLong { .. } => Vec::new(),
            Expr::Array(items) | Expr::Do(items) => items.iter_mut().collect(),
            Expr::Record(fields) => fields.iter_mut().map(|(_, e)| e).collect(),
            Expr::Binary { lhs, rhs, .. } => vec![lhs.as_mut(), rhs.as_mut()],
            Expr::Not(e) | Expr::IsNull(e) | Expr::Count(e) | Expr::Sum(e) => vec![e.as_mut()],
            Expr::Write { value, .. } => vec![value.as_mut()],
            Expr::If {
                test,
                then,
                otherwise,
            } => {
                let mut out = vec![test.as_mut(), then.as_mut()];
                out.extend(otherwise.as_deref_mut());
                out
            }
            Expr::For { binding, body } => {
                let mut out: Vec<&mut Expr> = binding.exprs.iter_mut().collect();
                out.push(body.as_mut());
                out
            }
            Expr::Binding(binding) => binding.exprs.iter_mut().collect(),
            Expr::Function(def) => vec![Rc::make_mut(def).body_mut()],
            Expr::Call { func, args } => {
                let mut out = vec![func.as_mut()];
                out.extend(args.iter_mut());
                out
            }
            Expr::Split(split) => split.children_mut(),
            Expr::ReadConf { name, default } => {
                let mut out = vec![name.as_mut()];
                out.extend(default.as_deref_mut());
                out
            }
        }
    }

    /// Whether child `index` is evaluated exactly once each time this node is.
    pub fn evaluates_child_once(&self, index: usize) -> Bool3 {
        match self {
            Expr::If { .. } => Bool3::from_bool(index == 0),
            Expr::For { binding, .. } => Bool3::from_bool(index < binding.exprs.len()),
            Expr::Function(_) => Bool3::False,
            Expr::Split(split) => split.evaluates_child_once(index),
            Expr::ReadConf { .. } => Bool3::from_bool(index == 0),
            Expr::Binding(binding) => binding.evaluates_child_once(index),
            _ => Bool3::True,
        }
    }

    /// Record one entry per reference to `var` under this node: whether
    /// every node on the path evaluates the reference exactly once.
    pub fn var_uses(&self, var: &Var, once: bool, uses: &mut Vec<bool>) {
        if let Expr::Var(v) = self {
            if v == var {
                uses.push(once);
            }
            return;
        }
        for (i, child) in self.children().into_iter().enumerate() {
            let child_once = once && self.evaluates_child_once(i).always();
            child.var_uses(var, child_once, uses);
        }
    }

    /// Variables bound by binding, `for` and split nodes under this one.
    /// Nested function definitions keep their own binders and are skipped.
    pub fn collect_binders(&self, out: &mut IndexSet<Var>) {
        match self {
            Expr::Function(_) => return,
            Expr::Binding(binding) | Expr::For { binding, .. } => {
                out.extend(binding.bound_vars().cloned())
            }
            Expr::Split(split) => out.extend(split.binding().bound_vars().cloned()),
            _ => {}
        }
        for child in self.children() {
            child.collect_binders(out);
        }
    }

    pub fn count_uses(&self, var: &Var) -> usize {
        let mut uses = Vec::new();
        self.var_uses(var, true, &mut uses);
        uses.len()
    }

    /// Replace every reference to `var` with a copy of `replacement`.
    pub fn substitute(&mut self, var: &Var, replacement: &Expr) -> usize {
        if let Expr::Var(v) = self {
            if v == var {
                *self = replacement.clone();
                return 1;
            }
            return 0;
        }
        self.children_mut()
            .into_iter()
            .map(|child| child.substitute(var, replacement))
            .sum()
    }

    /// False when evaluating this node may have an effect beyond producing
    /// its value.
    pub fn is_pure(&self) -> bool {
        match self {
            Expr::Write { .. }
            | Expr::RandomLong { .. }
            | Expr::Split(_)
            | Expr::Call { .. }
            | Expr::ReadConf { .. } => false,
            _ => self.children().into_iter().all(Expr::is_pure),
        }
    }

    /// Render this node as surface syntax. Variables referenced but not
    /// bound inside the rendered text are added to `captured`.
    pub fn decompile(&self, out: &mut String, captured: &mut IndexSet<Var>) -> fmt::Result {
        match self {
            Expr::Const(value) => decompile_value(value, out, captured),
            Expr::Var(var) => {
                captured.insert(var.clone());
                out.write_str(var.name())
            }
            Expr::Array(items) => {
                out.write_char('[')?;
                decompile_list(items.iter(), out, captured)?;
                out.write_char(']')
            }
            Expr::Record(fields) => {
                out.write_char('{')?;
                for (i, (name, e)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.write_str(", ")?;
                    }
                    write_json_string(out, name)?;
                    out.write_str(": ")?;
                    e.decompile(out, captured)?;
                }
                out.write_char('}')
            }
            Expr::Binary { op, lhs, rhs } => {
                out.write_char('(')?;
                lhs.decompile(out, captured)?;
                write!(out, " {} ", op)?;
                rhs.decompile(out, captured)?;
                out.write_char(')')
            }
            Expr::Not(e) => {
                out.write_str("not (")?;
                e.decompile(out, captured)?;
                out.write_char(')')
            }
            Expr::IsNull(e) => decompile_call("isnull", [e.as_ref()], out, captured),
            Expr::If {
                test,
                then,
                otherwise,
            } => {
                out.write_str("if( ")?;
                test.decompile(out, captured)?;
                out.write_str(" ) ( ")?;
                then.decompile(out, captured)?;
                out.write_str(" )")?;
                if let Some(e) = otherwise {
                    out.write_str(" else ( ")?;
                    e.decompile(out, captured)?;
                    out.write_str(" )")?;
                }
                Ok(())
            }
            Expr::Do(exprs) => {
                out.write_str("( ")?;
                decompile_list(exprs.iter(), out, captured)?;
                out.write_str(" )")?;
                for e in exprs {
                    if let Expr::Binding(b) = e {
                        for v in b.bound_vars() {
                            captured.shift_remove(v);
                        }
                    }
                }
                Ok(())
            }
            Expr::For { binding, body } => {
                out.write_str("for( ")?;
                match (binding.kind, &binding.var2) {
                    (BindingKind::InRec, Some(value)) => {
                        write!(out, "{}, {}", binding.var.name(), value.name())?
                    }
                    (BindingKind::In, Some(index)) => {
                        write!(out, "{} at {}", binding.var.name(), index.name())?
                    }
                    _ => out.write_str(binding.var.name())?,
                }
                out.write_str(" in ")?;
                decompile_source(binding, out, captured)?;
                out.write_str(" ) ( ")?;
                body.decompile(out, captured)?;
                out.write_str(" )")?;
                for v in binding.bound_vars() {
                    captured.shift_remove(v);
                }
                Ok(())
            }
            Expr::Binding(binding) => binding.decompile(out, captured),
            Expr::Function(def) => def.decompile(out, captured),
            Expr::Call { func, args } => {
                out.write_char('(')?;
                func.decompile(out, captured)?;
                out.write_str(")(")?;
                decompile_list(args.iter(), out, captured)?;
                out.write_char(')')
            }
            Expr::Split(split) => split.decompile(out, captured),
            Expr::ReadConf { name, default } => {
                let args: Vec<&Expr> = std::iter::once(name.as_ref())
                    .chain(default.as_deref())
                    .collect();
                decompile_call("readConf", args, out, captured)
            }
            Expr::Count(e) => decompile_call("count", [e.as_ref()], out, captured),
            Expr::Sum(e) => decompile_call("sum", [e.as_ref()], out, captured),
            Expr::Write { target, value } => {
                out.write_str("write(")?;
                write_json_string(out, target)?;
                out.write_str(", ")?;
                value.decompile(out, captured)?;
                out.write_char(')')
            }
            Expr::RandomLong { key } => {
                out.write_str("randomLong(")?;
                write_json_string(out, key)?;
                out.write_char(')')
            }
        }
    }

    /// Decompiled text of this node.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut captured = IndexSet::new();
        let _ = self.decompile(&mut out, &mut captured);
        out
    }

    /// Variables this node references without binding them.
    pub fn free_vars(&self) -> IndexSet<Var> {
        let mut out = String::new();
        let mut captured = IndexSet::new();
        let _ = self.decompile(&mut out, &mut captured);
        captured
    }

    /// Structural copy with binders replaced per `map` (fresh on first
    /// sight) and references to mapped variables redirected.
    pub fn clone_with(&self, map: &mut VarMap) -> Expr {
        match self {
            Expr::Const(value) => Expr::Const(value.clone()),
            Expr::Var(var) => Expr::Var(map.remap_ref(var)),
            Expr::Array(items) => Expr::Array(items.iter().map(|e| e.clone_with(map)).collect()),
            Expr::Record(fields) => Expr::Record(
                fields
                    .iter()
                    .map(|(k, e)| (k.clone(), e.clone_with(map)))
                    .collect(),
            ),
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(lhs.clone_with(map)),
                rhs: Box::new(rhs.clone_with(map)),
            },
            Expr::Not(e) => Expr::Not(Box::new(e.clone_with(map))),
            Expr::IsNull(e) => Expr::IsNull(Box::new(e.clone_with(map))),
            Expr::If {
                test,
                then,
                otherwise,
            } => Expr::If {
                test: Box::new(test.clone_with(map)),
                then: Box::new(then.clone_with(map)),
                otherwise: otherwise.as_ref().map(|e| Box::new(e.clone_with(map))),
            },
            Expr::Do(exprs) => Expr::Do(exprs.iter().map(|e| e.clone_with(map)).collect()),
            Expr::For { binding, body } => {
                let binding = binding.clone_with(map);
                Expr::For {
                    binding,
                    body: Box::new(body.clone_with(map)),
                }
            }
            Expr::Binding(binding) => Expr::Binding(binding.clone_with(map)),
            Expr::Function(def) => Expr::Function(Rc::new(def.clone_with(map))),
            Expr::Call { func, args } => Expr::Call {
                func: Box::new(func.clone_with(map)),
                args: args.iter().map(|e| e.clone_with(map)).collect(),
            },
            Expr::Split(split) => Expr::Split(split.clone_with(map)),
            Expr::ReadConf { name, default } => Expr::ReadConf {
                name: Box::new(name.clone_with(map)),
                default: default.as_ref().map(|e| Box::new(e.clone_with(map))),
            },
            Expr::Count(e) => Expr::Count(Box::new(e.clone_with(map))),
            Expr::Sum(e) => Expr::Sum(Box::new(e.clone_with(map))),
            Expr::Write { target, value } => Expr::Write {
                target: target.clone(),
                value: Box::new(value.clone_with(map)),
            },
            Expr::RandomLong { key } => Expr::RandomLong { key: key.clone() },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn decompile_list<'a>(
    exprs: impl Iterator<Item = &'a Expr>,
    out: &mut String,
    captured: &mut IndexSet<Var>,
) -> fmt::Result {
    for (i, e) in exprs.enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        e.decompile(out, captured)?;
    }
    Ok(())
}

fn decompile_call<'a>(
    name: &str,
    args: impl IntoIterator<Item = &'a Expr>,
    out: &mut String,
    captured: &mut IndexSet<Var>,
) -> fmt::Result {
    write!(out, "{}(", name)?;
    decompile_list(args.into_iter(), out, captured)?;
    out.write_char(')')
}

/// The source child of `binding`, or a placeholder when it has none.
pub(crate) fn decompile_source(
    binding: &BindingExpr,
    out: &mut String,
    captured: &mut IndexSet<Var>,
) -> fmt::Result {
    match binding.exprs.first() {
        Some(source) => source.decompile(out, captured),
        None => out.write_str("??"),
    }
}

// Function values render as their definition; closures carry their
// snapshot as leading bindings in the body.
fn decompile_value(value: &Value, out: &mut String, captured: &mut IndexSet<Var>) -> fmt::Result {
    match value {
        Value::Function(f) => f.definition().decompile(out, captured),
        Value::Array(items) => {
            out.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                decompile_value(item, out, captured)?;
            }
            out.write_char(']')
        }
        Value::Record(fields) => {
            out.write_char('{')?;
            for (i, (name, item)) in fields.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_json_string(out, name)?;
                out.write_str(": ")?;
                decompile_value(item, out, captured)?;
            }
            out.write_char('}')
        }
        other => write!(out, "{}", other),
    }
}

struct ForIter<'a> {
    source: BoxedIter<'a>,
    body: &'a Expr,
    inner: Option<BoxedIter<'a>>,
    current: Value,
}

impl JsonIter for ForIter<'_> {
    fn advance(&mut self, ctx: &mut Context) -> EvalResult<bool> {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if inner.advance(ctx)? {
                    self.current = inner.current().clone();
                    return Ok(true);
                }
                self.inner = None;
            }
            if !self.source.advance(ctx)? {
                self.current = Value::Null;
                return Ok(false);
            }
            self.inner = match self.body.eval(ctx)? {
                Value::Null => None,
                value @ (Value::Array(_) | Value::Spilled(_)) => Some(iter_value(value, "for")?),
                other => Some(Box::new(ValuesIter::new(vec![other]))),
            };
        }
    }

    fn current(&self) -> &Value {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::EvalError;
    use crate::runtime::iter::collect;
    use pretty_assertions::assert_eq;

    fn arr(values: &[i64]) -> Expr {
        Expr::Const(Value::Array(values.iter().map(|n| Value::Long(*n)).collect()))
    }

    #[test]
    fn for_concatenates_and_skips_null() {
        let mut ctx = Context::new();
        let x = Var::new("x");
        let body = Expr::if_else(
            Expr::binary(BinaryOp::Eq, Expr::var(&x), Expr::long(2)),
            Expr::null(),
            Some(Expr::Array(vec![Expr::var(&x), Expr::var(&x)])),
        );
        let e = Expr::for_each(BindingExpr::iterate(x.clone(), arr(&[1, 2, 3])), body);
        let expected = Value::Array(vec![1, 1, 3, 3].into_iter().map(Value::Long).collect());
        assert_eq!(e.eval(&mut ctx).unwrap(), expected);
        let mut it = e.iter(&mut ctx).unwrap();
        assert_eq!(Value::Array(collect(it.as_mut(), &mut ctx).unwrap()), expected);
        assert!(e.schema().matches(&expected));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let mut ctx = Context::new();
        let undefined = Var::new("u");
        let e = Expr::binary(BinaryOp::And, Expr::Const(Value::Bool(false)), Expr::var(&undefined));
        assert_eq!(e.eval(&mut ctx), Ok(Value::Bool(false)));
        let e = Expr::binary(BinaryOp::Or, Expr::null(), Expr::Const(Value::Bool(false)));
        assert_eq!(e.eval(&mut ctx), Ok(Value::Null));
    }

    #[test]
    fn decompile_renders_surface_syntax() {
        let x = Var::new("x");
        let y = Var::new("y");
        let e = Expr::Do(vec![
            Expr::Binding(BindingExpr::eq(x.clone(), Expr::long(1))),
            Expr::if_else(
                Expr::IsNull(Box::new(Expr::var(&y))),
                Expr::Record(vec![("k".to_string(), Expr::var(&x))]),
                Some(Expr::Not(Box::new(Expr::Const(Value::Bool(true))))),
            ),
        ]);
        let mut out = String::new();
        let mut captured = IndexSet::new();
        e.decompile(&mut out, &mut captured).unwrap();
        assert_eq!(
            out,
            r#"( x = 1, if( isnull(y) ) ( {"k": x} ) else ( not (true) ) )"#
        );
        assert_eq!(captured.into_iter().collect::<Vec<_>>(), vec![y]);
    }

    #[test]
    fn clone_with_separates_bound_variables() {
        let mut ctx = Context::new();
        let x = Var::new("x");
        let outer = Var::new("o");
        let e = Expr::for_each(
            BindingExpr::iterate(x.clone(), arr(&[1, 2])),
            Expr::binary(BinaryOp::Add, Expr::var(&x), Expr::var(&outer)),
        );
        let copy = e.clone_with(&mut VarMap::new());
        if let Expr::For { binding, .. } = &copy {
            assert_ne!(binding.var, x);
        } else {
            panic!("expected for, got {:?}", copy);
        }
        outer.set_value(Value::Long(10));
        assert_eq!(copy.eval(&mut ctx), e.eval(&mut ctx));
        assert!(copy.free_vars().contains(&outer));
    }

    #[test]
    fn evaluation_cardinality() {
        let x = Var::new("x");
        let e = Expr::for_each(BindingExpr::iterate(x.clone(), arr(&[1])), Expr::var(&x));
        assert_eq!(e.evaluates_child_once(0), Bool3::True);
        assert_eq!(e.evaluates_child_once(1), Bool3::False);
        let cond = Expr::if_else(Expr::var(&x), Expr::long(1), Some(Expr::long(2)));
        assert_eq!(cond.evaluates_child_once(0), Bool3::True);
        assert_eq!(cond.evaluates_child_once(2), Bool3::False);
    }

    #[test]
    fn missing_array_is_a_type_error_when_iterated() {
        let mut ctx = Context::new();
        assert!(matches!(
            Expr::long(3).iter(&mut ctx),
            Err(EvalError::TypeMismatch { .. })
        ));
    }
}
