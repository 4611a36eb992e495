//! Recorded objects and their retaining edges

use crate::value::{HeapId, ObjectKind};
use serde::Serialize;

/// Edge description of the walk root
pub const REGISTRY_DESCRIPTION: &str = "[registry]";

/// How an object was reached from its parent
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Walk root
    Registry,
    /// Metatable of a table or userdata
    Metatable,
    /// Key of a table entry
    TableKey,
    /// Value of a table entry
    TableValue,
    /// Auxiliary value of a userdata
    UserValue,
    /// Captured upvalue of a function
    Upvalue,
    /// Value-stack slot or frame local of a thread
    StackSlot,
}

/// One retaining edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkSource {
    /// Object holding the reference (`None` for the root)
    pub parent: Option<HeapId>,
    /// Human-readable edge description (field name, `[key]`, local name, ...)
    pub description: String,
    /// Edge category
    pub kind: SourceKind,
}

impl MarkSource {
    /// Edge into the walk root
    pub fn root() -> Self {
        Self {
            parent: None,
            description: REGISTRY_DESCRIPTION.to_string(),
            kind: SourceKind::Registry,
        }
    }

    /// Edge from `parent`
    pub fn new(parent: HeapId, description: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            parent: Some(parent),
            description: description.into(),
            kind,
        }
    }
}

/// Record kept for each unique object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDescription {
    /// Object kind
    pub kind: ObjectKind,
    /// Rendered value, prefixed by the metatable's `__name` when declared
    pub value: String,
    /// Retaining edges in discovery order
    pub sources: Vec<MarkSource>,
}

impl ObjectDescription {
    /// Create a description with its first retaining edge
    pub fn new(kind: ObjectKind, value: String, source: MarkSource) -> Self {
        Self {
            kind,
            value,
            sources: vec![source],
        }
    }

    /// Whether any edge comes from `parent`
    pub fn is_retained_by(&self, parent: HeapId) -> bool {
        self.sources.iter().any(|s| s.parent == Some(parent))
    }
}
