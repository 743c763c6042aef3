// Binding nodes: a variable together with the expression that defines or feeds it

use crate::ir::{decompile_source, Expr};
use crate::runtime::context::Context;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::iter::{BoxedIter, JsonIter};
use crate::runtime::values::Value;
use crate::runtime::var::{Var, VarMap};
use crate::schema::{Bool3, Schema};
use indexmap::IndexSet;
use std::fmt::{self, Write};

/// How a binding's children feed its variables.
///
/// | kind    | child 0          | var              | var2                        |
/// |---------|------------------|------------------|-----------------------------|
/// | `Eq`    | defining expr    | bound name       | -                           |
/// | `In`    | source sequence  | element          | optional index / group into |
/// | `InRec` | record expr      | field name       | field value                 |
///
/// `InPair`, `InAgg` and `AggFn` belong to the join and grouping operators.
/// Here they iterate their source like `In`, without the index variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Eq,
    In,
    InRec,
    InPair,
    InAgg,
    AggFn,
}

#[derive(Debug, Clone)]
pub struct BindingExpr {
    pub kind: BindingKind,
    pub var: Var,
    pub var2: Option<Var>,
    /// Join input whose rows are kept even without a match. Carried through
    /// cloning; evaluation does not read it.
    pub preserve: bool,
    pub exprs: Vec<Expr>,
}

impl BindingExpr {
    pub fn new(kind: BindingKind, var: Var, var2: Option<Var>, exprs: Vec<Expr>) -> Self {
        let binding = BindingExpr {
            kind,
            var,
            var2,
            preserve: false,
            exprs,
        };
        binding.assign_schemas();
        binding
    }

    /// `var = value`
    pub fn eq(var: Var, value: Expr) -> Self {
        BindingExpr::new(BindingKind::Eq, var, None, vec![value])
    }

    /// A childless binding, as used for function parameters.
    pub fn param(var: Var) -> Self {
        BindingExpr {
            kind: BindingKind::Eq,
            var,
            var2: None,
            preserve: false,
            exprs: Vec::new(),
        }
    }

    /// `var in source`
    pub fn iterate(var: Var, source: Expr) -> Self {
        BindingExpr::new(BindingKind::In, var, None, vec![source])
    }

    /// `var at index in source`
    pub fn iterate_indexed(var: Var, index: Var, source: Expr) -> Self {
        BindingExpr::new(BindingKind::In, var, Some(index), vec![source])
    }

    /// `name, value in record`
    pub fn record_fields(name: Var, value: Var, record: Expr) -> Self {
        BindingExpr::new(BindingKind::InRec, name, Some(value), vec![record])
    }

    pub fn preserved(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn child(&self, index: usize) -> EvalResult<&Expr> {
        self.exprs.get(index).ok_or_else(|| EvalError::MissingChild {
            node: format!("binding of {}", self.var.name()),
            index,
        })
    }

    /// Defining expression of an `Eq` binding, or the source of an iteration.
    pub fn source(&self) -> EvalResult<&Expr> {
        self.child(0)
    }

    pub fn bound_vars(&self) -> impl Iterator<Item = &Var> {
        std::iter::once(&self.var).chain(self.var2.iter())
    }

    fn assign_schemas(&self) {
        let Some(source) = self.exprs.first() else {
            return;
        };
        let schema = source.schema();
        match self.kind {
            BindingKind::Eq => self.var.set_schema(schema),
            BindingKind::InRec => {
                self.var.set_schema(Schema::String);
                if let Some(value) = &self.var2 {
                    value.set_schema(record_value_schema(&schema));
                }
            }
            BindingKind::In => {
                self.var.set_schema(schema.element_schema());
                if let Some(index) = &self.var2 {
                    index.set_schema(Schema::Number);
                }
            }
            BindingKind::InPair | BindingKind::InAgg | BindingKind::AggFn => {
                self.var.set_schema(schema.element_schema());
            }
        }
    }

    /// Bind the variable to the value of child 0. Yields null.
    pub fn eval(&self, ctx: &mut Context) -> EvalResult<Value> {
        let value = self.source()?.eval(ctx)?;
        self.var.set_value(value);
        Ok(Value::Null)
    }

    /// Iterate the source, binding the variable to each element in turn.
    /// The variable is undefined before the first element and again once the
    /// source is exhausted.
    pub fn iter<'a>(&'a self, ctx: &mut Context) -> EvalResult<BoxedIter<'a>> {
        self.var.undefine();
        if let Some(var2) = &self.var2 {
            var2.undefine();
        }
        let source = self.source()?;
        if self.kind == BindingKind::InRec {
            let fields = match source.eval(ctx)? {
                Value::Record(fields) => fields,
                Value::Null => Default::default(),
                other => {
                    return Err(EvalError::type_mismatch(
                        "record",
                        other.type_name(),
                        "record binding",
                    ))
                }
            };
            return Ok(Box::new(RecordFieldsIter {
                binding: self,
                fields: fields.into_iter(),
                current: Value::Null,
                done: false,
            }));
        }
        Ok(Box::new(BindingIter {
            binding: self,
            source: source.iter(ctx)?,
            index: 0,
            current: Value::Null,
            done: false,
        }))
    }

    /// Schema of the values this binding draws from its first child.
    pub fn schema(&self) -> Schema {
        self.exprs.first().map_or(Schema::Null, Expr::schema)
    }

    /// Every child is evaluated once.
    pub fn evaluates_child_once(&self, _index: usize) -> Bool3 {
        Bool3::True
    }

    pub fn decompile(&self, out: &mut String, captured: &mut IndexSet<Var>) -> fmt::Result {
        write!(out, "{} = ", self.var.name())?;
        decompile_source(self, out, captured)
    }

    pub fn clone_with(&self, map: &mut VarMap) -> BindingExpr {
        let exprs = self.exprs.iter().map(|e| e.clone_with(map)).collect();
        BindingExpr {
            kind: self.kind,
            var: map.remap_binder(&self.var),
            var2: self.var2.as_ref().map(|v| map.remap_binder(v)),
            preserve: self.preserve,
            exprs,
        }
    }

    fn finish(&self) {
        self.var.undefine();
        if let Some(var2) = &self.var2 {
            var2.undefine();
        }
    }
}

fn record_value_schema(record: &Schema) -> Schema {
    match record {
        Schema::Record { fields, open: false } => fields
            .values()
            .cloned()
            .reduce(|acc, s| acc.union(&s))
            .unwrap_or(Schema::Any),
        _ => Schema::Any,
    }
}

struct BindingIter<'a> {
    binding: &'a BindingExpr,
    source: BoxedIter<'a>,
    index: i64,
    current: Value,
    done: bool,
}

impl JsonIter for BindingIter<'_> {
    fn advance(&mut self, ctx: &mut Context) -> EvalResult<bool> {
        if self.done {
            return Ok(false);
        }
        if self.source.advance(ctx)? {
            self.current = self.source.current().clone();
            self.binding.var.set_value(self.current.clone());
            if self.binding.kind == BindingKind::In {
                if let Some(index) = &self.binding.var2 {
                    index.set_value(Value::Long(self.index));
                }
            }
            self.index += 1;
            return Ok(true);
        }
        self.done = true;
        self.current = Value::Null;
        self.binding.finish();
        Ok(false)
    }

    fn current(&self) -> &Value {
        &self.current
    }
}

struct RecordFieldsIter<'a> {
    binding: &'a BindingExpr,
    fields: indexmap::map::IntoIter<String, Value>,
    current: Value,
    done: bool,
}

impl JsonIter for RecordFieldsIter<'_> {
    fn advance(&mut self, _ctx: &mut Context) -> EvalResult<bool> {
        if self.done {
            return Ok(false);
        }
        match self.fields.next() {
            Some((name, value)) => {
                self.binding.var.set_value(Value::String(name));
                if let Some(var2) = &self.binding.var2 {
                    var2.set_value(value.clone());
                }
                self.current = value;
                Ok(true)
            }
            None => {
                self.done = true;
                self.current = Value::Null;
                self.binding.finish();
                Ok(false)
            }
        }
    }

    fn current(&self) -> &Value {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_sets_variable_and_yields_null() {
        let mut ctx = Context::new();
        let x = Var::new("x");
        let b = BindingExpr::eq(x.clone(), Expr::Const(Value::Long(4)));
        assert_eq!(b.eval(&mut ctx), Ok(Value::Null));
        assert_eq!(x.value(), Ok(Value::Long(4)));
        assert_eq!(x.schema(), Schema::Number);
    }

    #[test]
    fn childless_binding_fails_and_decompiles_as_placeholder() {
        let mut ctx = Context::new();
        let b = BindingExpr::param(Var::new("p"));
        assert!(matches!(b.eval(&mut ctx), Err(EvalError::MissingChild { index: 0, .. })));
        let mut text = String::new();
        b.decompile(&mut text, &mut IndexSet::new()).unwrap();
        assert_eq!(text, "p = ??");
    }

    #[test]
    fn indexed_iteration_sets_both_variables() {
        let mut ctx = Context::new();
        let (x, i) = (Var::new("x"), Var::new("i"));
        let source = Expr::Const(Value::Array(vec![Value::string("a"), Value::string("b")]));
        let b = BindingExpr::iterate_indexed(x.clone(), i.clone(), source);
        let mut it = b.iter(&mut ctx).unwrap();
        assert!(it.advance(&mut ctx).unwrap());
        assert!(it.advance(&mut ctx).unwrap());
        assert_eq!(x.value(), Ok(Value::string("b")));
        assert_eq!(i.value(), Ok(Value::Long(1)));
        assert!(!it.advance(&mut ctx).unwrap());
        assert!(!x.is_defined());
        assert!(!i.is_defined());
    }

    #[test]
    fn record_binding_walks_fields() {
        let mut ctx = Context::new();
        let (k, v) = (Var::new("k"), Var::new("v"));
        let mut fields = indexmap::IndexMap::new();
        fields.insert("a".to_string(), Value::Long(1));
        fields.insert("b".to_string(), Value::Long(2));
        let b = BindingExpr::record_fields(k.clone(), v.clone(), Expr::Const(Value::Record(fields)));
        assert_eq!(v.schema(), Schema::Number);
        let mut it = b.iter(&mut ctx).unwrap();
        assert!(it.advance(&mut ctx).unwrap());
        assert_eq!(k.value(), Ok(Value::string("a")));
        assert_eq!(v.value(), Ok(Value::Long(1)));
        assert!(it.advance(&mut ctx).unwrap());
        assert!(!it.advance(&mut ctx).unwrap());
        assert!(!k.is_defined());
    }

    #[test]
    fn preserve_flag_survives_cloning() {
        let x = Var::new("x");
        let source = Expr::Const(Value::Array(vec![Value::Long(1)]));
        let b = BindingExpr::iterate(x, source).preserved(true);
        let copy = b.clone_with(&mut VarMap::new());
        assert!(copy.preserve);
        assert!(!BindingExpr::param(Var::new("p")).clone_with(&mut VarMap::new()).preserve);
    }

    #[test]
    fn grouping_kinds_iterate_their_source() {
        let mut ctx = Context::new();
        for kind in [BindingKind::InPair, BindingKind::InAgg, BindingKind::AggFn] {
            let (x, i) = (Var::new("x"), Var::new("i"));
            let source = Expr::Const(Value::Array(vec![Value::Long(1), Value::Long(2)]));
            let b = BindingExpr::new(kind, x.clone(), Some(i.clone()), vec![source]);
            assert_eq!(x.schema(), Schema::Number);
            let mut it = b.iter(&mut ctx).unwrap();
            assert!(it.advance(&mut ctx).unwrap());
            assert!(it.advance(&mut ctx).unwrap());
            assert_eq!(x.value(), Ok(Value::Long(2)));
            assert!(!i.is_defined());
            assert!(!it.advance(&mut ctx).unwrap());
            assert!(!x.is_defined());
        }
    }

    #[test]
    fn clone_gets_fresh_binder() {
        let x = Var::new("x");
        let b = BindingExpr::eq(x.clone(), Expr::Const(Value::Long(1)));
        let mut map = VarMap::new();
        let copy = b.clone_with(&mut map);
        assert_ne!(copy.var, x);
        assert_eq!(copy.var.name(), "x");
        assert_eq!(map.remap_ref(&x), copy.var);
    }
}
