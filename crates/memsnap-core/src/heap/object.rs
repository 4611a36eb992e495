//! Heap values and objects

use crate::inspect::{CallFrame, FunctionSource};
use crate::value::ObjectKind;

/// Reference to an object slot in a [`super::ScriptHeap`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjRef(pub(super) u32);

impl ObjRef {
    /// Slot index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A value held by the heap
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// nil
    Nil,
    /// Boolean
    Boolean(bool),
    /// Number
    Number(f64),
    /// String (strings are values, not recorded objects)
    Str(String),
    /// Bare host pointer
    LightUserData(usize),
    /// Heap-allocated object
    Object(ObjRef),
}

impl Value {
    /// Check if nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Object reference, if this value is a heap object
    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Table object
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Entries in insertion order; keys are unique
    pub entries: Vec<(Value, Value)>,
    /// Metatable
    pub metatable: Option<ObjRef>,
}

impl Table {
    /// Raw lookup
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Raw assignment; assigning nil removes the entry
    pub fn set(&mut self, key: Value, value: Value) {
        let existing = self.entries.iter().position(|(k, _)| *k == key);
        match (existing, value.is_nil()) {
            (Some(i), true) => {
                self.entries.remove(i);
            }
            (Some(i), false) => self.entries[i].1 = value,
            (None, true) => {}
            (None, false) => self.entries.push((key, value)),
        }
    }
}

/// Function object
#[derive(Debug, Clone)]
pub struct Function {
    /// Definition site
    pub source: FunctionSource,
    /// Captured upvalues
    pub upvalues: Vec<(Option<String>, Value)>,
}

/// Thread (coroutine) object
#[derive(Debug, Clone, Default)]
pub struct Thread {
    /// Value stack, bottom first
    pub stack: Vec<Value>,
    /// Active frames, innermost first
    pub frames: Vec<CallFrame<Value>>,
}

/// Full userdata object
#[derive(Debug, Clone, Default)]
pub struct UserData {
    /// Metatable
    pub metatable: Option<ObjRef>,
    /// Auxiliary value
    pub user_value: Option<Value>,
}

/// Object stored in a heap slot
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// Table
    Table(Table),
    /// Function
    Function(Function),
    /// Thread
    Thread(Thread),
    /// Full userdata
    UserData(UserData),
}

impl HeapObject {
    /// Object kind
    pub fn kind(&self) -> ObjectKind {
        match self {
            HeapObject::Table(_) => ObjectKind::Table,
            HeapObject::Function(_) => ObjectKind::Function,
            HeapObject::Thread(_) => ObjectKind::Thread,
            HeapObject::UserData(_) => ObjectKind::UserData,
        }
    }

    /// Metatable of a table or userdata
    pub fn metatable(&self) -> Option<ObjRef> {
        match self {
            HeapObject::Table(t) => t.metatable,
            HeapObject::UserData(u) => u.metatable,
            _ => None,
        }
    }
}
