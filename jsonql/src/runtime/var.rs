// Variable slots and capture-safe remapping

use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::Value;
use crate::schema::Schema;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

/// How a function parameter is referenced by the function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarUsage {
    /// Never referenced.
    Unused,
    /// Referenced exactly once, on a path where every ancestor evaluates it once.
    Stream,
    /// Anything else: the value has to be retained.
    Eval,
}

struct VarSlot {
    id: u64,
    name: String,
    value: RefCell<Option<Value>>,
    usage: Cell<VarUsage>,
    schema: RefCell<Schema>,
}

/// A named storage slot. Identity is the slot, not the name: two variables
/// called `x` are unrelated. Clones of a `Var` refer to the same slot.
#[derive(Clone)]
pub struct Var(Rc<VarSlot>);

impl Var {
    pub fn new(name: &str) -> Self {
        Var::with_schema(name, Schema::Any)
    }

    pub fn with_schema(name: &str, schema: Schema) -> Self {
        Var(Rc::new(VarSlot {
            id: NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            value: RefCell::new(None),
            usage: Cell::new(VarUsage::Eval),
            schema: RefCell::new(schema),
        }))
    }

    /// A fresh, undefined slot with the same display name and schema.
    pub fn fresh_like(&self) -> Self {
        Var::with_schema(&self.0.name, self.schema())
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn set_value(&self, value: Value) {
        *self.0.value.borrow_mut() = Some(value);
    }

    pub fn undefine(&self) {
        *self.0.value.borrow_mut() = None;
    }

    pub fn is_defined(&self) -> bool {
        self.0.value.borrow().is_some()
    }

    pub fn value(&self) -> EvalResult<Value> {
        self.0
            .value
            .borrow()
            .clone()
            .ok_or_else(|| EvalError::UndefinedVariable {
                name: self.0.name.clone(),
            })
    }

    /// Swap the slot contents, returning what was there. Used to save and
    /// restore parameter slots around a call.
    pub fn replace(&self, value: Option<Value>) -> Option<Value> {
        self.0.value.replace(value)
    }

    pub fn usage(&self) -> VarUsage {
        self.0.usage.get()
    }

    pub fn set_usage(&self, usage: VarUsage) {
        self.0.usage.set(usage);
    }

    pub fn schema(&self) -> Schema {
        self.0.schema.borrow().clone()
    }

    pub fn set_schema(&self, schema: Schema) {
        *self.0.schema.borrow_mut() = schema;
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.id)
    }
}

/// Old-to-new variable mapping used when cloning a subtree.
///
/// Binders met during the clone get a fresh slot on first sight; references
/// to variables bound outside the cloned subtree are left alone unless they
/// were mapped up front (closure conversion does exactly that).
#[derive(Debug, Default)]
pub struct VarMap {
    map: HashMap<Var, Var>,
}

impl VarMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh variables for every variable in `vars`, as a total mapping.
    pub fn fresh_for<'a>(vars: impl IntoIterator<Item = &'a Var>) -> Self {
        let mut map = VarMap::new();
        for var in vars {
            map.insert(var.clone(), var.fresh_like());
        }
        map
    }

    pub fn insert(&mut self, old: Var, new: Var) {
        self.map.insert(old, new);
    }

    pub fn get(&self, old: &Var) -> Option<&Var> {
        self.map.get(old)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remap a variable introduced by the subtree being cloned.
    pub fn remap_binder(&mut self, var: &Var) -> Var {
        self.map
            .entry(var.clone())
            .or_insert_with(|| var.fresh_like())
            .clone()
    }

    /// Remap a variable reference; unmapped (free) variables stay as they are.
    pub fn remap_ref(&self, var: &Var) -> Var {
        self.map.get(var).cloned().unwrap_or_else(|| var.clone())
    }
}
