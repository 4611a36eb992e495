//! Runtime heap-inspection capability
//!
//! The walker never touches a runtime directly. Everything it needs (type
//! checks, identities, table iteration, upvalues, call frames) goes through
//! [`HeapInspector`], so any runtime that can answer these questions can be
//! snapshotted.

use crate::value::{HeapId, ObjectKind, ValueClass};
use crate::Result;

/// Where a function was defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionSource {
    /// Host-implemented function
    Native,
    /// Scripted function
    Script {
        /// Short source name (`short_src`)
        source: String,
        /// Line where the definition starts
        line_defined: u32,
    },
}

/// One active call frame of a thread
#[derive(Debug, Clone)]
pub struct CallFrame<V> {
    /// Short source name of the running function
    pub source: String,
    /// Line currently executing, if known
    pub current_line: Option<u32>,
    /// Visible locals, in declaration order
    pub locals: Vec<(String, V)>,
}

/// Read-only view of a scripting runtime's heap
///
/// Implementations must not run scripted code other than what rendering
/// inherently needs (`__tostring`), and must not mutate the heap.
pub trait HeapInspector {
    /// Runtime value handle
    type Value: Clone;

    /// Classify a value
    fn classify(&self, value: &Self::Value) -> ValueClass;

    /// Identity of a composite value
    fn identity(&self, value: &Self::Value) -> HeapId;

    /// Human-readable rendering of a value
    fn render(&self, value: &Self::Value) -> Result<String>;

    /// Metatable of a table or userdata
    fn metatable(&self, value: &Self::Value) -> Result<Option<Self::Value>>;

    /// Raw (metamethod-free) field lookup on a table
    fn raw_field(&self, table: &Self::Value, name: &str) -> Result<Option<Self::Value>>;

    /// String contents of a string or number value
    fn text(&self, value: &Self::Value) -> Option<String>;

    /// Every key/value pair of a table, each exactly once
    fn table_entries(&self, table: &Self::Value) -> Result<Vec<(Self::Value, Self::Value)>>;

    /// Captured upvalues of a function, with names when the runtime has them
    fn upvalues(&self, function: &Self::Value) -> Result<Vec<(Option<String>, Self::Value)>>;

    /// Definition site of a function
    fn function_source(&self, function: &Self::Value) -> Result<FunctionSource>;

    /// Auxiliary value attached to a userdata, `None` when nil
    fn user_value(&self, userdata: &Self::Value) -> Result<Option<Self::Value>>;

    /// Live value-stack slots of a suspended thread, 1-based
    fn thread_stack(&self, thread: &Self::Value) -> Result<Vec<(usize, Self::Value)>>;

    /// Active call frames of a thread, innermost first
    fn call_frames(&self, thread: &Self::Value) -> Result<Vec<CallFrame<Self::Value>>>;

    /// Whether `thread` is the thread currently executing the walk
    fn is_running(&self, thread: &Self::Value) -> bool;

    /// Kind of a value, or `None` for scalars
    fn kind_of(&self, value: &Self::Value) -> Option<ObjectKind> {
        self.classify(value).kind()
    }

    /// `__name` declared by a metatable
    fn declared_name(&self, metatable: &Self::Value) -> Option<String> {
        match self.raw_field(metatable, "__name") {
            Ok(Some(name)) => self.text(&name),
            _ => None,
        }
    }
}
