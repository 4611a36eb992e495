//! Lua backend
//!
//! Inspects a live Lua 5.4 state through its `debug` library, so only states
//! created with the debug library loaded (`Lua::unsafe_new`, or
//! `StdLib::DEBUG`) can be snapshotted.
//!
//! The value stack of a suspended coroutine is copied out by a small C
//! function, since the debug library has no access to it.

mod library;

pub use library::{open, MemorySnapshot};

use crate::config::WalkOptions;
use crate::inspect::{CallFrame, FunctionSource, HeapInspector};
use crate::snapshot::Snapshot;
use crate::value::{HeapId, ObjectKind, ValueClass};
use crate::{Result, SnapshotError};
use mlua::{ffi, Function, Lua, MultiValue, Table, Thread, Value};
use std::os::raw::c_int;

/// Return every value on the stack of the thread passed as argument 1
///
/// Returns nothing for the calling thread itself, whose stack is the walk's
/// own, or when either stack cannot grow.
unsafe extern "C-unwind" fn stack_slots(state: *mut ffi::lua_State) -> c_int {
    let thread = ffi::lua_tothread(state, 1);
    if thread.is_null() || thread == state {
        return 0;
    }
    let top = ffi::lua_gettop(thread);
    if ffi::lua_checkstack(state, top) == 0 || ffi::lua_checkstack(thread, 1) == 0 {
        return 0;
    }
    for slot in 1..=top {
        ffi::lua_pushvalue(thread, slot);
        ffi::lua_xmove(thread, state, 1);
    }
    top
}

/// [`HeapInspector`] over a live Lua state
pub struct LuaInspector<'lua> {
    getmetatable: Function<'lua>,
    getupvalue: Function<'lua>,
    getuservalue: Function<'lua>,
    getinfo: Function<'lua>,
    getlocal: Function<'lua>,
    getregistry: Function<'lua>,
    tostring: Function<'lua>,
    running: Function<'lua>,
    stack_slots: Function<'lua>,
}

impl<'lua> LuaInspector<'lua> {
    /// Capture the inspection functions of `lua`
    pub fn new(lua: &'lua Lua) -> Result<Self> {
        let globals = lua.globals();
        let debug: Option<Table<'lua>> = globals.get("debug")?;
        let debug = debug.ok_or_else(|| {
            SnapshotError::Inspect("the debug library is not loaded".to_string())
        })?;
        let coroutine: Table<'lua> = globals.get("coroutine")?;

        Ok(Self {
            getmetatable: debug.get("getmetatable")?,
            getupvalue: debug.get("getupvalue")?,
            getuservalue: debug.get("getuservalue")?,
            getinfo: debug.get("getinfo")?,
            getlocal: debug.get("getlocal")?,
            getregistry: debug.get("getregistry")?,
            tostring: globals.get("tostring")?,
            running: coroutine.get("running")?,
            // Only reads the target thread's stack
            stack_slots: unsafe { lua.create_c_function(stack_slots)? },
        })
    }

    /// The registry table, root of every walk
    pub fn registry(&self) -> Result<Value<'lua>> {
        Ok(self.getregistry.call::<_, Value<'lua>>(())?)
    }

    /// Frames of `thread` starting at stack level `first_level`
    fn frames_from(
        &self,
        thread: &Thread<'lua>,
        first_level: i64,
    ) -> Result<Vec<CallFrame<Value<'lua>>>> {
        let mut frames = Vec::new();
        let mut level = first_level;
        loop {
            let info: Option<Table<'lua>> =
                self.getinfo.call((thread.clone(), level, "Sl"))?;
            let Some(info) = info else {
                break;
            };

            let source: String = info.get::<_, Option<String>>("short_src")?.unwrap_or_default();
            let current_line: i64 = info.get::<_, Option<i64>>("currentline")?.unwrap_or(-1);
            let mut frame = CallFrame {
                source,
                current_line: u32::try_from(current_line).ok(),
                locals: Vec::new(),
            };

            // Named locals and temporaries count up from 1, varargs down from -1
            for step in [1i64, -1] {
                let mut n = step;
                loop {
                    let (name, value): (Option<String>, Value<'lua>) =
                        self.getlocal.call((thread.clone(), level, n))?;
                    let Some(name) = name else {
                        break;
                    };
                    frame.locals.push((name, value));
                    n += step;
                }
            }

            frames.push(frame);
            level += 1;
        }
        Ok(frames)
    }
}

impl<'lua> HeapInspector for LuaInspector<'lua> {
    type Value = Value<'lua>;

    fn classify(&self, value: &Value<'lua>) -> ValueClass {
        match value {
            Value::Table(_) => ValueClass::Object(ObjectKind::Table),
            Value::Function(_) => ValueClass::Object(ObjectKind::Function),
            Value::Thread(_) => ValueClass::Object(ObjectKind::Thread),
            Value::UserData(_) => ValueClass::Object(ObjectKind::UserData),
            Value::LightUserData(_) => ValueClass::Object(ObjectKind::LightUserData),
            _ => ValueClass::Scalar,
        }
    }

    fn identity(&self, value: &Value<'lua>) -> HeapId {
        HeapId::from_ptr(value.to_pointer())
    }

    fn render(&self, value: &Value<'lua>) -> Result<String> {
        self.tostring
            .call::<_, String>(value.clone())
            .map_err(|e| SnapshotError::Unrepresentable {
                kind: value.type_name(),
                reason: e.to_string(),
            })
    }

    fn metatable(&self, value: &Value<'lua>) -> Result<Option<Value<'lua>>> {
        let metatable: Option<Table<'lua>> = self.getmetatable.call(value.clone())?;
        Ok(metatable.map(Value::Table))
    }

    fn raw_field(&self, table: &Value<'lua>, name: &str) -> Result<Option<Value<'lua>>> {
        match table {
            Value::Table(t) => match t.raw_get::<_, Value<'lua>>(name)? {
                Value::Nil => Ok(None),
                value => Ok(Some(value)),
            },
            _ => Ok(None),
        }
    }

    fn text(&self, value: &Value<'lua>) -> Option<String> {
        match value {
            Value::String(s) => s.to_str().ok().map(str::to_owned),
            Value::Integer(i) => Some(i.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn table_entries(&self, table: &Value<'lua>) -> Result<Vec<(Value<'lua>, Value<'lua>)>> {
        let Value::Table(t) = table else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for pair in t.clone().pairs::<Value<'lua>, Value<'lua>>() {
            entries.push(pair?);
        }
        Ok(entries)
    }

    fn upvalues(&self, function: &Value<'lua>) -> Result<Vec<(Option<String>, Value<'lua>)>> {
        let mut upvalues = Vec::new();
        for index in 1i64.. {
            let (name, value): (Option<String>, Value<'lua>) =
                self.getupvalue.call((function.clone(), index))?;
            match name {
                Some(name) => upvalues.push(((!name.is_empty()).then_some(name), value)),
                None => break,
            }
        }
        Ok(upvalues)
    }

    fn function_source(&self, function: &Value<'lua>) -> Result<FunctionSource> {
        let info: Table<'lua> = self.getinfo.call((function.clone(), "S"))?;
        let what: String = info.get("what")?;
        if what == "C" {
            return Ok(FunctionSource::Native);
        }
        let source: Option<String> = info.get("short_src")?;
        let line_defined: Option<i64> = info.get("linedefined")?;
        Ok(FunctionSource::Script {
            source: source.unwrap_or_default(),
            line_defined: line_defined.and_then(|l| u32::try_from(l).ok()).unwrap_or(0),
        })
    }

    fn user_value(&self, userdata: &Value<'lua>) -> Result<Option<Value<'lua>>> {
        match self.getuservalue.call::<_, Value<'lua>>(userdata.clone())? {
            Value::Nil => Ok(None),
            value => Ok(Some(value)),
        }
    }

    fn thread_stack(&self, thread: &Value<'lua>) -> Result<Vec<(usize, Value<'lua>)>> {
        let Value::Thread(_) = thread else {
            return Ok(Vec::new());
        };
        let slots = self.stack_slots.call::<_, MultiValue<'lua>>(thread.clone())?;
        Ok(slots
            .into_iter()
            .enumerate()
            .map(|(i, value)| (i + 1, value))
            .collect())
    }

    fn call_frames(&self, thread: &Value<'lua>) -> Result<Vec<CallFrame<Value<'lua>>>> {
        let Value::Thread(t) = thread else {
            return Ok(Vec::new());
        };
        // Level 0 of the running thread is the debug function itself
        let first_level = if self.is_running(thread) { 1 } else { 0 };
        self.frames_from(t, first_level)
    }

    fn is_running(&self, thread: &Value<'lua>) -> bool {
        match self.running.call::<_, (Thread<'lua>, bool)>(()) {
            Ok((current, _)) => Value::Thread(current).to_pointer() == thread.to_pointer(),
            Err(_) => false,
        }
    }
}

/// Snapshot the whole state, walking from the registry
///
/// The collector is stopped for the duration of the walk so that weak
/// entries and unreferenced objects stay put while they are being inspected.
pub fn take_snapshot(lua: &Lua, options: &WalkOptions) -> Result<Snapshot> {
    let inspector = LuaInspector::new(lua)?;
    let registry = inspector.registry()?;

    let was_running = lua.gc_is_running();
    lua.gc_stop();
    let snapshot = Snapshot::take(&inspector, &registry, options);
    if was_running {
        lua.gc_restart();
    }
    Ok(snapshot)
}
