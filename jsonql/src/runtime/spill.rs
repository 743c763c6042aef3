// Append-only value buffers that overflow to a temporary file

use crate::runtime::context::Context;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::iter::JsonIter;
use crate::runtime::values::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::NamedTempFile;

/// Where and when buffers start spilling.
#[derive(Debug, Clone, PartialEq)]
pub struct SpillSettings {
    /// Values kept in memory before writing to disk.
    pub threshold: usize,
    /// Directory for spill files; the OS temp dir when `None`.
    pub dir: Option<PathBuf>,
}

impl Default for SpillSettings {
    fn default() -> Self {
        SpillSettings {
            threshold: 4096,
            dir: None,
        }
    }
}

/// On-disk form of a value. Functions have no serialized form.
#[derive(Debug, Serialize, Deserialize)]
enum StoredValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
    Array(Vec<StoredValue>),
    Record(Vec<(String, StoredValue)>),
}

impl StoredValue {
    fn from_value(value: &Value) -> EvalResult<StoredValue> {
        Ok(match value {
            Value::Null => StoredValue::Null,
            Value::Bool(b) => StoredValue::Bool(*b),
            Value::Long(n) => StoredValue::Long(*n),
            Value::Double(d) => StoredValue::Double(*d),
            Value::String(s) => StoredValue::String(s.clone()),
            Value::Array(items) => StoredValue::Array(
                items
                    .iter()
                    .map(StoredValue::from_value)
                    .collect::<EvalResult<_>>()?,
            ),
            Value::Spilled(spilled) => StoredValue::Array(
                spilled
                    .to_vec()?
                    .iter()
                    .map(StoredValue::from_value)
                    .collect::<EvalResult<_>>()?,
            ),
            Value::Record(fields) => StoredValue::Record(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), StoredValue::from_value(v)?)))
                    .collect::<EvalResult<_>>()?,
            ),
            Value::Function(_) => {
                return Err(EvalError::Spill(
                    "function values cannot be written to a spill file".to_string(),
                ))
            }
        })
    }

    fn into_value(self) -> Value {
        match self {
            StoredValue::Null => Value::Null,
            StoredValue::Bool(b) => Value::Bool(b),
            StoredValue::Long(n) => Value::Long(n),
            StoredValue::Double(d) => Value::Double(d),
            StoredValue::String(s) => Value::String(s),
            StoredValue::Array(items) => {
                Value::Array(items.into_iter().map(StoredValue::into_value).collect())
            }
            StoredValue::Record(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect::<IndexMap<_, _>>(),
            ),
        }
    }
}

/// Buffer being filled. Call [`SpillBuffer::finish`] to read it back.
pub struct SpillBuffer {
    settings: SpillSettings,
    memory: Vec<Value>,
    file: Option<(NamedTempFile, BufWriter<File>)>,
    spilled: usize,
}

impl SpillBuffer {
    pub fn new(settings: SpillSettings) -> Self {
        SpillBuffer {
            settings,
            memory: Vec::new(),
            file: None,
            spilled: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.memory.len() + self.spilled
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, value: Value) -> EvalResult<()> {
        if self.file.is_none() && self.memory.len() < self.settings.threshold {
            self.memory.push(value);
            return Ok(());
        }
        let stored = StoredValue::from_value(&value)?;
        if self.file.is_none() {
            let named = create_spill_file(self.settings.dir.as_deref())?;
            let writer = BufWriter::new(named.as_file().try_clone()?);
            log::debug!(
                "spill buffer exceeded {} values, spilling to {}",
                self.settings.threshold,
                named.path().display()
            );
            self.file = Some((named, writer));
        }
        if let Some((_, writer)) = self.file.as_mut() {
            bincode::serialize_into(writer, &stored)?;
        }
        self.spilled += 1;
        Ok(())
    }

    pub fn finish(self) -> EvalResult<SpilledArray> {
        let file = match self.file {
            Some((named, mut writer)) => {
                writer.flush()?;
                Some(named)
            }
            None => None,
        };
        Ok(SpilledArray {
            store: Rc::new(SpillStore {
                memory: self.memory,
                file,
                spilled: self.spilled,
            }),
        })
    }
}

fn create_spill_file(dir: Option<&Path>) -> EvalResult<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("jsonql-spill-");
    Ok(match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    })
}

struct SpillStore {
    memory: Vec<Value>,
    file: Option<NamedTempFile>,
    spilled: usize,
}

/// A finished, immutable buffer. Cheap to clone; every iteration re-reads
/// the spill file from the start through its own handle.
#[derive(Clone)]
pub struct SpilledArray {
    store: Rc<SpillStore>,
}

impl SpilledArray {
    pub fn len(&self) -> usize {
        self.store.memory.len() + self.store.spilled
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_spilled(&self) -> bool {
        self.store.spilled > 0
    }

    pub fn iter(&self) -> SpillIter {
        SpillIter {
            store: Rc::clone(&self.store),
            index: 0,
            reader: None,
            read: 0,
            current: Value::Null,
            done: false,
        }
    }

    pub fn to_vec(&self) -> EvalResult<Vec<Value>> {
        let mut out = self.store.memory.clone();
        if let Some(named) = &self.store.file {
            let mut reader = BufReader::new(named.reopen()?);
            for _ in 0..self.store.spilled {
                let stored: StoredValue = bincode::deserialize_from(&mut reader)?;
                out.push(stored.into_value());
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for SpilledArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpilledArray")
            .field("in_memory", &self.store.memory.len())
            .field("spilled", &self.store.spilled)
            .finish()
    }
}

pub struct SpillIter {
    store: Rc<SpillStore>,
    index: usize,
    reader: Option<BufReader<File>>,
    read: usize,
    current: Value,
    done: bool,
}

impl JsonIter for SpillIter {
    fn advance(&mut self, _ctx: &mut Context) -> EvalResult<bool> {
        if self.done {
            return Ok(false);
        }
        if self.index < self.store.memory.len() {
            self.current = self.store.memory[self.index].clone();
            self.index += 1;
            return Ok(true);
        }
        if self.read < self.store.spilled {
            if self.reader.is_none() {
                if let Some(named) = &self.store.file {
                    self.reader = Some(BufReader::new(named.reopen()?));
                }
            }
            if let Some(reader) = self.reader.as_mut() {
                let stored: StoredValue = bincode::deserialize_from(reader)?;
                self.current = stored.into_value();
                self.read += 1;
                return Ok(true);
            }
        }
        self.done = true;
        self.reader = None;
        self.current = Value::Null;
        Ok(false)
    }

    fn current(&self) -> &Value {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::iter::collect;
    use pretty_assertions::assert_eq;

    fn settings(threshold: usize, dir: &Path) -> SpillSettings {
        SpillSettings {
            threshold,
            dir: Some(dir.to_path_buf()),
        }
    }

    #[test]
    fn small_buffer_stays_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = SpillBuffer::new(settings(10, dir.path()));
        buf.push(Value::Long(1)).unwrap();
        let arr = buf.finish().unwrap();
        assert!(!arr.has_spilled());
        assert_eq!(arr.to_vec().unwrap(), vec![Value::Long(1)]);
    }

    #[test]
    fn overflow_is_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = SpillBuffer::new(settings(2, dir.path()));
        let mut expected = Vec::new();
        for i in 0..7 {
            let v = if i % 2 == 0 {
                Value::Long(i)
            } else {
                Value::Array(vec![Value::string("x"), Value::Double(i as f64)])
            };
            expected.push(v.clone());
            buf.push(v).unwrap();
        }
        let arr = buf.finish().unwrap();
        assert!(arr.has_spilled());
        assert_eq!(arr.len(), 7);

        let mut ctx = Context::new();
        let first = collect(&mut arr.iter(), &mut ctx).unwrap();
        let second = collect(&mut arr.iter(), &mut ctx).unwrap();
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    #[test]
    fn functions_cannot_spill() {
        use crate::ir::function::DefineFunction;
        use crate::ir::Expr;
        use crate::runtime::values::FunctionValue;

        let dir = tempfile::tempdir().unwrap();
        let mut buf = SpillBuffer::new(settings(0, dir.path()));
        let def = DefineFunction::new(vec![], Expr::Const(Value::Null));
        let f = Value::Function(FunctionValue::new(Rc::new(def), false));
        assert!(matches!(buf.push(f), Err(EvalError::Spill(_))));
    }
}
