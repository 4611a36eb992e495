//! Object identity and kind classification
//!
//! Every composite heap value the walker meets is classified into exactly one
//! [`ObjectKind`] and keyed by a [`HeapId`]. Scalars (nil, booleans, numbers,
//! strings) are never recorded as objects; they only appear in edge and value
//! text.

use serde::Serialize;
use std::ffi::c_void;
use std::fmt;

/// Identity of one composite heap value within a single walk
///
/// Usually the runtime's raw object address. Identities are only comparable
/// between snapshots of the same live runtime: once an object is collected its
/// address may be handed to a new, unrelated object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(u64);

impl HeapId {
    /// Create an identity from a raw token
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Create an identity from a runtime object pointer
    pub fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr as usize as u64)
    }

    /// Get the raw token
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for HeapId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Kind of a recorded heap object
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Key/value table
    Table,
    /// Scripted or native function
    Function,
    /// Coroutine
    Thread,
    /// Full userdata (runtime-managed block with metatable and user value)
    UserData,
    /// Bare host pointer
    LightUserData,
}

impl ObjectKind {
    /// All kinds, in report order
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Table,
        ObjectKind::Function,
        ObjectKind::Thread,
        ObjectKind::UserData,
        ObjectKind::LightUserData,
    ];

    /// Runtime type name
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::Function => "function",
            ObjectKind::Thread => "thread",
            ObjectKind::UserData => "userdata",
            ObjectKind::LightUserData => "lightuserdata",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of classifying a runtime value
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueClass {
    /// A composite object the walker records
    Object(ObjectKind),
    /// nil, boolean, number, string
    Scalar,
}

impl ValueClass {
    /// Object kind, if this is not a scalar
    pub fn kind(self) -> Option<ObjectKind> {
        match self {
            ValueClass::Object(kind) => Some(kind),
            ValueClass::Scalar => None,
        }
    }
}
