//! Arena heap model
//!
//! A slot-based heap of tables, functions, threads and userdata shaped like a
//! Lua state: a registry table is the root, holding the main thread and the
//! globals table. Hosts that mirror their own object graph can populate it
//! and snapshot it through the same walker used for live runtimes.
//!
//! Freed slots are reused by later allocations, so an identity seen in an old
//! snapshot can denote a different object in a new one, exactly like a
//! reused address after collection.

mod object;

pub use object::{Function, HeapObject, ObjRef, Table, Thread, UserData, Value};

use crate::inspect::{CallFrame, FunctionSource, HeapInspector};
use crate::value::{HeapId, ObjectKind, ValueClass};
use crate::{Result, SnapshotError};

/// Base of the synthetic address range objects are placed at
const OBJECT_BASE: u64 = 0x5500_0000_0000;

/// Distance between two synthetic object addresses
const OBJECT_STRIDE: u64 = 0x40;

/// Registry index of the main thread
pub const RIDX_MAINTHREAD: f64 = 1.0;

/// Registry index of the globals table
pub const RIDX_GLOBALS: f64 = 2.0;

/// Heap model errors
#[derive(Debug, thiserror::Error)]
pub enum HeapError {
    /// Reference to a freed or never-allocated slot
    #[error("Dangling object reference: slot {0}")]
    Dangling(usize),

    /// Operation applied to the wrong kind of value
    #[error("Expected {expected}, found {found}")]
    WrongKind {
        /// Kind the operation needs
        expected: &'static str,
        /// Kind actually found
        found: &'static str,
    },

    /// Frame index out of range
    #[error("Thread has no frame {0}")]
    NoFrame(usize),
}

/// Heap model result
pub type HeapResult<T> = std::result::Result<T, HeapError>;

impl From<HeapError> for SnapshotError {
    fn from(e: HeapError) -> Self {
        SnapshotError::Inspect(e.to_string())
    }
}

/// Arena heap
pub struct ScriptHeap {
    /// Object slots (`None` once freed)
    slots: Vec<Option<HeapObject>>,

    /// Freed slots, reused last-in first-out
    free_slots: Vec<u32>,

    /// Root table
    registry: ObjRef,

    /// Thread considered to be executing
    running: ObjRef,
}

impl ScriptHeap {
    /// Create a heap with a registry, a main thread and a globals table
    pub fn new() -> Self {
        let mut heap = Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            registry: ObjRef(0),
            running: ObjRef(0),
        };
        heap.running = heap.alloc(HeapObject::Thread(Thread::default()));
        let globals = heap.alloc(HeapObject::Table(Table::default()));

        let mut registry = Table::default();
        registry.set(RIDX_MAINTHREAD.into(), Value::Object(heap.running));
        registry.set(RIDX_GLOBALS.into(), Value::Object(globals));
        heap.registry = heap.alloc(HeapObject::Table(registry));
        heap
    }

    /// Root table
    pub fn registry(&self) -> Value {
        Value::Object(self.registry)
    }

    /// Globals table
    pub fn globals(&self) -> Value {
        self.table(self.registry)
            .ok()
            .and_then(|t| t.get(&RIDX_GLOBALS.into()).cloned())
            .unwrap_or(Value::Nil)
    }

    /// Main thread
    pub fn main_thread(&self) -> Value {
        self.table(self.registry)
            .ok()
            .and_then(|t| t.get(&RIDX_MAINTHREAD.into()).cloned())
            .unwrap_or(Value::Nil)
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Allocate an empty table
    pub fn new_table(&mut self) -> Value {
        Value::Object(self.alloc(HeapObject::Table(Table::default())))
    }

    /// Allocate a scripted function
    pub fn new_function(
        &mut self,
        source: &str,
        line_defined: u32,
        upvalues: Vec<(Option<String>, Value)>,
    ) -> Value {
        let function = Function {
            source: FunctionSource::Script {
                source: source.to_string(),
                line_defined,
            },
            upvalues,
        };
        Value::Object(self.alloc(HeapObject::Function(function)))
    }

    /// Allocate a native function
    pub fn new_native(&mut self, upvalues: Vec<(Option<String>, Value)>) -> Value {
        let function = Function {
            source: FunctionSource::Native,
            upvalues,
        };
        Value::Object(self.alloc(HeapObject::Function(function)))
    }

    /// Allocate a thread
    pub fn new_thread(&mut self) -> Value {
        Value::Object(self.alloc(HeapObject::Thread(Thread::default())))
    }

    /// Allocate a full userdata
    pub fn new_userdata(&mut self) -> Value {
        Value::Object(self.alloc(HeapObject::UserData(UserData::default())))
    }

    /// Free an object; its slot (and identity) will be reused
    pub fn free(&mut self, value: &Value) -> HeapResult<()> {
        let obj = self.object_ref(value)?;
        self.object(obj)?;
        self.slots[obj.index()] = None;
        self.free_slots.push(obj.0);
        Ok(())
    }

    /// Raw table assignment
    pub fn set(&mut self, table: &Value, key: impl Into<Value>, value: Value) -> HeapResult<()> {
        let obj = self.object_ref(table)?;
        self.table_mut(obj)?.set(key.into(), value);
        Ok(())
    }

    /// Raw table lookup
    pub fn get(&self, table: &Value, key: impl Into<Value>) -> HeapResult<Value> {
        let obj = self.object_ref(table)?;
        Ok(self.table(obj)?.get(&key.into()).cloned().unwrap_or(Value::Nil))
    }

    /// Set (or clear) the metatable of a table or userdata
    pub fn set_metatable(&mut self, value: &Value, metatable: Option<&Value>) -> HeapResult<()> {
        let mt = match metatable {
            Some(mt) => {
                let mt = self.object_ref(mt)?;
                self.table(mt)?;
                Some(mt)
            }
            None => None,
        };
        let obj = self.object_ref(value)?;
        match self.object_mut(obj)? {
            HeapObject::Table(t) => t.metatable = mt,
            HeapObject::UserData(u) => u.metatable = mt,
            other => {
                return Err(HeapError::WrongKind {
                    expected: "table or userdata",
                    found: other.kind().name(),
                })
            }
        }
        Ok(())
    }

    /// Attach an auxiliary value to a userdata
    pub fn set_user_value(&mut self, userdata: &Value, value: Value) -> HeapResult<()> {
        let obj = self.object_ref(userdata)?;
        match self.object_mut(obj)? {
            HeapObject::UserData(u) => {
                u.user_value = if value.is_nil() { None } else { Some(value) };
                Ok(())
            }
            other => Err(HeapError::WrongKind {
                expected: "userdata",
                found: other.kind().name(),
            }),
        }
    }

    /// Push a value onto a thread's value stack
    pub fn push(&mut self, thread: &Value, value: Value) -> HeapResult<()> {
        let obj = self.object_ref(thread)?;
        self.thread_mut(obj)?.stack.push(value);
        Ok(())
    }

    /// Enter a new innermost frame on a thread
    pub fn push_frame(
        &mut self,
        thread: &Value,
        source: &str,
        current_line: Option<u32>,
    ) -> HeapResult<()> {
        let obj = self.object_ref(thread)?;
        self.thread_mut(obj)?.frames.insert(
            0,
            CallFrame {
                source: source.to_string(),
                current_line,
                locals: Vec::new(),
            },
        );
        Ok(())
    }

    /// Declare a local in a thread's frame (0 = innermost)
    pub fn set_local(
        &mut self,
        thread: &Value,
        frame: usize,
        name: &str,
        value: Value,
    ) -> HeapResult<()> {
        let obj = self.object_ref(thread)?;
        let frame = self
            .thread_mut(obj)?
            .frames
            .get_mut(frame)
            .ok_or(HeapError::NoFrame(frame))?;
        frame.locals.push((name.to_string(), value));
        Ok(())
    }

    /// Make `thread` the executing thread
    pub fn set_running(&mut self, thread: &Value) -> HeapResult<()> {
        let obj = self.object_ref(thread)?;
        self.thread_mut(obj)?;
        self.running = obj;
        Ok(())
    }

    // ── Slot access ──────────────────────────────────────────────────

    fn alloc(&mut self, object: HeapObject) -> ObjRef {
        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(object);
                ObjRef(slot)
            }
            None => {
                self.slots.push(Some(object));
                ObjRef((self.slots.len() - 1) as u32)
            }
        }
    }

    fn object_ref(&self, value: &Value) -> HeapResult<ObjRef> {
        value.as_object().ok_or(HeapError::WrongKind {
            expected: "object",
            found: scalar_name(value),
        })
    }

    fn object(&self, obj: ObjRef) -> HeapResult<&HeapObject> {
        self.slots
            .get(obj.index())
            .and_then(Option::as_ref)
            .ok_or(HeapError::Dangling(obj.index()))
    }

    fn object_mut(&mut self, obj: ObjRef) -> HeapResult<&mut HeapObject> {
        self.slots
            .get_mut(obj.index())
            .and_then(Option::as_mut)
            .ok_or(HeapError::Dangling(obj.index()))
    }

    fn table(&self, obj: ObjRef) -> HeapResult<&Table> {
        match self.object(obj)? {
            HeapObject::Table(t) => Ok(t),
            other => Err(HeapError::WrongKind {
                expected: "table",
                found: other.kind().name(),
            }),
        }
    }

    fn table_mut(&mut self, obj: ObjRef) -> HeapResult<&mut Table> {
        match self.object_mut(obj)? {
            HeapObject::Table(t) => Ok(t),
            other => Err(HeapError::WrongKind {
                expected: "table",
                found: other.kind().name(),
            }),
        }
    }

    fn thread_mut(&mut self, obj: ObjRef) -> HeapResult<&mut Thread> {
        match self.object_mut(obj)? {
            HeapObject::Thread(t) => Ok(t),
            other => Err(HeapError::WrongKind {
                expected: "thread",
                found: other.kind().name(),
            }),
        }
    }

    fn heap_object(&self, value: &Value) -> Result<&HeapObject> {
        let obj = self.object_ref(value)?;
        Ok(self.object(obj)?)
    }
}

impl Default for ScriptHeap {
    fn default() -> Self {
        Self::new()
    }
}

fn scalar_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Number(_) => "number",
        Value::Str(_) => "string",
        Value::LightUserData(_) => "lightuserdata",
        Value::Object(_) => "object",
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl HeapInspector for ScriptHeap {
    type Value = Value;

    fn classify(&self, value: &Value) -> ValueClass {
        match value {
            Value::LightUserData(_) => ValueClass::Object(ObjectKind::LightUserData),
            Value::Object(obj) => match self.object(*obj) {
                Ok(object) => ValueClass::Object(object.kind()),
                Err(_) => ValueClass::Scalar,
            },
            _ => ValueClass::Scalar,
        }
    }

    fn identity(&self, value: &Value) -> HeapId {
        match value {
            Value::LightUserData(addr) => HeapId::new(*addr as u64),
            Value::Object(obj) => HeapId::new(OBJECT_BASE + obj.0 as u64 * OBJECT_STRIDE),
            _ => HeapId::new(0),
        }
    }

    fn render(&self, value: &Value) -> Result<String> {
        match value {
            Value::Nil => Ok("nil".to_string()),
            Value::Boolean(b) => Ok(b.to_string()),
            Value::Number(n) => Ok(format_number(*n)),
            Value::Str(s) => Ok(s.clone()),
            Value::LightUserData(addr) => Ok(format!("userdata: {:#x}", addr)),
            Value::Object(obj) => {
                let object = self.object(*obj)?;
                let kind = object.kind();
                if let Some(mt) = object.metatable() {
                    match self.table(mt)?.get(&"__tostring".into()) {
                        None => {}
                        Some(Value::Str(s)) => return Ok(s.clone()),
                        Some(Value::Number(n)) => return Ok(format_number(*n)),
                        Some(other) => {
                            return Err(SnapshotError::Unrepresentable {
                                kind: kind.name(),
                                reason: format!("__tostring is a {}", scalar_name(other)),
                            })
                        }
                    }
                }
                Ok(format!("{}: {}", kind.name(), self.identity(value)))
            }
        }
    }

    fn metatable(&self, value: &Value) -> Result<Option<Value>> {
        match value {
            Value::Object(_) => Ok(self.heap_object(value)?.metatable().map(Value::Object)),
            _ => Ok(None),
        }
    }

    fn raw_field(&self, table: &Value, name: &str) -> Result<Option<Value>> {
        Ok(self.get(table, name).map(|v| (!v.is_nil()).then_some(v))?)
    }

    fn text(&self, value: &Value) -> Option<String> {
        match value {
            Value::Str(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    fn table_entries(&self, table: &Value) -> Result<Vec<(Value, Value)>> {
        match self.heap_object(table)? {
            HeapObject::Table(t) => Ok(t.entries.clone()),
            other => Err(HeapError::WrongKind {
                expected: "table",
                found: other.kind().name(),
            }
            .into()),
        }
    }

    fn upvalues(&self, function: &Value) -> Result<Vec<(Option<String>, Value)>> {
        match self.heap_object(function)? {
            HeapObject::Function(f) => Ok(f.upvalues.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn function_source(&self, function: &Value) -> Result<FunctionSource> {
        match self.heap_object(function)? {
            HeapObject::Function(f) => Ok(f.source.clone()),
            other => Err(HeapError::WrongKind {
                expected: "function",
                found: other.kind().name(),
            }
            .into()),
        }
    }

    fn user_value(&self, userdata: &Value) -> Result<Option<Value>> {
        match self.heap_object(userdata)? {
            HeapObject::UserData(u) => Ok(u.user_value.clone()),
            _ => Ok(None),
        }
    }

    fn thread_stack(&self, thread: &Value) -> Result<Vec<(usize, Value)>> {
        match self.heap_object(thread)? {
            HeapObject::Thread(t) => Ok(t
                .stack
                .iter()
                .enumerate()
                .map(|(i, v)| (i + 1, v.clone()))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn call_frames(&self, thread: &Value) -> Result<Vec<CallFrame<Value>>> {
        match self.heap_object(thread)? {
            HeapObject::Thread(t) => Ok(t.frames.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn is_running(&self, thread: &Value) -> bool {
        thread.as_object() == Some(self.running)
    }
}
