//! Heap walker
//!
//! Depth-first traversal of every composite value reachable from a root.
//! Each identity is recorded once; later encounters only append a
//! [`MarkSource`]. Weak table modes are honored the way the collector honors
//! them: a weak-keyed table does not retain its keys and a weak-valued table
//! does not retain its values.

use super::source::{MarkSource, ObjectDescription, SourceKind};
use super::store::Snapshot;
use crate::config::WalkOptions;
use crate::inspect::{CallFrame, FunctionSource, HeapInspector};
use crate::value::{HeapId, ObjectKind};

/// Edge description for table metatables
const METATABLE_DESCRIPTION: &str = "[metatable]";
/// Edge description for table keys
const KEY_DESCRIPTION: &str = "[key]";
/// Edge description for userdata user values
const USER_VALUE_DESCRIPTION: &str = "[uservalue]";
/// Edge description for unnamed upvalues
const UPVALUE_DESCRIPTION: &str = "[upvalue]";

/// Weak flags declared by a metatable's `__mode`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct WeakMode {
    keys: bool,
    values: bool,
}

/// One walk over a runtime heap
pub struct HeapWalker<'a, I: HeapInspector> {
    /// Runtime being inspected
    inspector: &'a I,

    /// Walk settings
    options: &'a WalkOptions,

    /// Objects recorded so far (doubles as the visited set)
    snapshot: Snapshot,
}

impl<'a, I: HeapInspector> HeapWalker<'a, I> {
    /// Create a walker
    pub fn new(inspector: &'a I, options: &'a WalkOptions) -> Self {
        Self {
            inspector,
            options,
            snapshot: Snapshot::new(),
        }
    }

    /// Walk everything reachable from `root`
    pub fn walk(mut self, root: &I::Value) -> Snapshot {
        self.visit(root, MarkSource::root());
        log::debug!("heap walk recorded {} objects", self.snapshot.len());
        self.snapshot
    }

    /// Record `value` reached through `source`, descending on first visit
    fn visit(&mut self, value: &I::Value, source: MarkSource) {
        let Some(kind) = self.inspector.kind_of(value) else {
            return;
        };
        let id = self.inspector.identity(value);
        if self.snapshot.contains(id) {
            self.snapshot.add_source(id, source);
            return;
        }

        // Frames feed both the thread's description and its local edges
        let frames = match kind {
            ObjectKind::Thread => self.call_frames(value, id),
            _ => Vec::new(),
        };

        let rendered = self.describe(value, kind, &frames);
        self.snapshot
            .insert(id, ObjectDescription::new(kind, rendered, source));

        match kind {
            ObjectKind::Table => self.visit_table(value, id),
            ObjectKind::UserData => self.visit_userdata(value, id),
            ObjectKind::Function => self.visit_function(value, id),
            ObjectKind::Thread => self.visit_thread(value, id, &frames),
            ObjectKind::LightUserData => {}
        }
    }

    fn call_frames(&self, thread: &I::Value, id: HeapId) -> Vec<CallFrame<I::Value>> {
        match self.inspector.call_frames(thread) {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("skipping frames of thread {}: {}", id, e);
                Vec::new()
            }
        }
    }

    fn visit_table(&mut self, table: &I::Value, id: HeapId) {
        let mut weak = WeakMode::default();
        match self.inspector.metatable(table) {
            Ok(Some(metatable)) => {
                self.visit(
                    &metatable,
                    MarkSource::new(id, METATABLE_DESCRIPTION, SourceKind::Metatable),
                );
                if self.options.honor_weak_tables {
                    weak = self.weak_mode(&metatable);
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("skipping metatable of table {}: {}", id, e),
        }

        let entries = match self.inspector.table_entries(table) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("skipping entries of table {}: {}", id, e);
                return;
            }
        };

        for (key, value) in &entries {
            if !weak.keys {
                self.visit(key, MarkSource::new(id, KEY_DESCRIPTION, SourceKind::TableKey));
            }
            if !weak.values {
                let name = self.render_or_placeholder(key);
                self.visit(value, MarkSource::new(id, name, SourceKind::TableValue));
            }
        }
    }

    fn visit_userdata(&mut self, userdata: &I::Value, id: HeapId) {
        match self.inspector.metatable(userdata) {
            Ok(Some(metatable)) => {
                let description = match self.inspector.declared_name(&metatable) {
                    Some(name) => format!("[userdata metatable {}]", name),
                    None => "[userdata metatable]".to_string(),
                };
                self.visit(
                    &metatable,
                    MarkSource::new(id, description, SourceKind::Metatable),
                );
            }
            Ok(None) => {}
            Err(e) => log::warn!("skipping metatable of userdata {}: {}", id, e),
        }

        match self.inspector.user_value(userdata) {
            Ok(Some(value)) => self.visit(
                &value,
                MarkSource::new(id, USER_VALUE_DESCRIPTION, SourceKind::UserValue),
            ),
            Ok(None) => {}
            Err(e) => log::warn!("skipping user value of userdata {}: {}", id, e),
        }
    }

    fn visit_function(&mut self, function: &I::Value, id: HeapId) {
        let upvalues = match self.inspector.upvalues(function) {
            Ok(upvalues) => upvalues,
            Err(e) => {
                log::warn!("skipping upvalues of function {}: {}", id, e);
                return;
            }
        };

        for (name, value) in &upvalues {
            let description = match name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => UPVALUE_DESCRIPTION.to_string(),
            };
            self.visit(value, MarkSource::new(id, description, SourceKind::Upvalue));
        }
    }

    fn visit_thread(&mut self, thread: &I::Value, id: HeapId, frames: &[CallFrame<I::Value>]) {
        // The running thread's value stack is the walk's own stack; only its
        // frame locals are inspected.
        if !self.inspector.is_running(thread) {
            match self.inspector.thread_stack(thread) {
                Ok(slots) => {
                    for (slot, value) in &slots {
                        let description = format!("[{}]", slot);
                        self.visit(value, MarkSource::new(id, description, SourceKind::StackSlot));
                    }
                }
                Err(e) => log::warn!("skipping stack of thread {}: {}", id, e),
            }
        }

        for frame in frames {
            let line = frame.current_line.map(i64::from).unwrap_or(-1);
            for (name, value) in &frame.locals {
                let description = format!("{} : {}:{}", name, frame.source, line);
                self.visit(value, MarkSource::new(id, description, SourceKind::StackSlot));
            }
        }
    }

    /// Rendered value text with metatable name and source metadata
    fn describe(
        &self,
        value: &I::Value,
        kind: ObjectKind,
        frames: &[CallFrame<I::Value>],
    ) -> String {
        let mut text = self.render_or_placeholder(value);

        if matches!(kind, ObjectKind::Table | ObjectKind::UserData) {
            if let Ok(Some(metatable)) = self.inspector.metatable(value) {
                if let Some(name) = self.inspector.declared_name(&metatable) {
                    if !text.starts_with(&format!("{}:", name)) {
                        text = format!("{}: {}", name, text);
                    }
                }
            }
        }

        match kind {
            ObjectKind::Function if self.options.function_sources => {
                match self.inspector.function_source(value) {
                    Ok(FunctionSource::Native) => text.push_str(" (cfunction)"),
                    Ok(FunctionSource::Script {
                        source,
                        line_defined,
                    }) => text.push_str(&format!(" ({}:{})", source, line_defined)),
                    Err(e) => log::warn!("no source for function: {}", e),
                }
            }
            ObjectKind::Thread if self.options.thread_frames && !frames.is_empty() => {
                let locations: Vec<String> = frames
                    .iter()
                    .map(|frame| match frame.current_line {
                        Some(line) => format!("{}:{}", frame.source, line),
                        None => frame.source.clone(),
                    })
                    .collect();
                text.push_str(&format!(" ({})", locations.join(" ")));
            }
            _ => {}
        }

        text
    }

    /// Render a value, substituting the placeholder on failure
    fn render_or_placeholder(&self, value: &I::Value) -> String {
        match self.inspector.render(value) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("substituting placeholder: {}", e);
                match &self.options.placeholder {
                    Some(placeholder) => placeholder.clone(),
                    None => {
                        let kind = self
                            .inspector
                            .kind_of(value)
                            .map(ObjectKind::name)
                            .unwrap_or("value");
                        format!("<unrepresentable {}>", kind)
                    }
                }
            }
        }
    }

    /// Read `__mode` from a metatable; anything but a string means "not weak"
    fn weak_mode(&self, metatable: &I::Value) -> WeakMode {
        let mode = match self.inspector.raw_field(metatable, "__mode") {
            Ok(Some(mode)) => self.inspector.text(&mode),
            _ => None,
        };
        match mode {
            Some(mode) => WeakMode {
                keys: mode.contains('k'),
                values: mode.contains('v'),
            },
            None => WeakMode::default(),
        }
    }
}
