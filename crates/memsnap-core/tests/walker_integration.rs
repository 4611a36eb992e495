//! Integration tests for the heap walker, differ and report writer over the
//! arena heap model.

use memsnap_core::heap::{ScriptHeap, Value};
use memsnap_core::{
    write_report, HeapInspector, MarkSource, ObjectKind, ReportFormat, Snapshot, SnapshotStore,
    SourceKind, WalkOptions,
};

fn walk(heap: &ScriptHeap) -> Snapshot {
    Snapshot::take(heap, &heap.registry(), &WalkOptions::default())
}

fn descriptions<'a>(snapshot: &'a Snapshot, heap: &ScriptHeap, value: &Value) -> Vec<&'a str> {
    snapshot
        .get(heap.identity(value))
        .map(|d| d.sources.iter().map(|s| s.description.as_str()).collect())
        .unwrap_or_default()
}

fn report_text(snapshot: &Snapshot) -> String {
    let mut buf = Vec::new();
    write_report(snapshot, &mut buf, ReportFormat::Text).unwrap();
    String::from_utf8(buf).unwrap()
}

// ────────────────────────────────────────────────────────────────────────────
// Graph shape
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_cycle_between_two_tables() {
    let mut heap = ScriptHeap::new();
    let t1 = heap.new_table();
    let t2 = heap.new_table();
    heap.set(&t1, "a", t2.clone()).unwrap();
    heap.set(&t2, "b", t1.clone()).unwrap();

    let snapshot = Snapshot::take(&heap, &t1, &WalkOptions::default());
    assert_eq!(snapshot.len(), 2);

    let id1 = heap.identity(&t1);
    let id2 = heap.identity(&t2);

    let d1 = snapshot.get(id1).unwrap();
    assert_eq!(d1.sources.len(), 2);
    assert_eq!(d1.sources[0], MarkSource::root());
    assert_eq!(d1.sources[1], MarkSource::new(id2, "b", SourceKind::TableValue));

    let d2 = snapshot.get(id2).unwrap();
    assert_eq!(d2.sources, vec![MarkSource::new(id1, "a", SourceKind::TableValue)]);
}

#[test]
fn test_cycle_reached_from_registry() {
    let mut heap = ScriptHeap::new();
    let registry = heap.registry();
    let t1 = heap.new_table();
    let t2 = heap.new_table();
    heap.set(&registry, "t1", t1.clone()).unwrap();
    heap.set(&t1, "a", t2.clone()).unwrap();
    heap.set(&t2, "b", t1.clone()).unwrap();

    let snapshot = walk(&heap);
    // registry, main thread, globals, t1, t2
    assert_eq!(snapshot.len(), 5);
    assert_eq!(descriptions(&snapshot, &heap, &t1), vec!["t1", "b"]);
    assert_eq!(descriptions(&snapshot, &heap, &t2), vec!["a"]);
    assert!(snapshot
        .get(heap.identity(&t1))
        .unwrap()
        .is_retained_by(heap.identity(&registry)));
}

#[test]
fn test_self_referencing_table() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let t = heap.new_table();
    heap.set(&globals, "loop", t.clone()).unwrap();
    heap.set(&t, "me", t.clone()).unwrap();

    let snapshot = walk(&heap);
    let id = heap.identity(&t);
    let desc = snapshot.get(id).unwrap();
    assert_eq!(snapshot.ids().filter(|&i| i == id).count(), 1);
    assert!(desc
        .sources
        .contains(&MarkSource::new(id, "me", SourceKind::TableValue)));
}

#[test]
fn test_multi_path_retention() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let left = heap.new_table();
    let right = heap.new_table();
    let shared = heap.new_table();
    heap.set(&globals, "left", left.clone()).unwrap();
    heap.set(&globals, "right", right.clone()).unwrap();
    heap.set(&left, "x", shared.clone()).unwrap();
    heap.set(&right, "y", shared.clone()).unwrap();

    let snapshot = walk(&heap);
    let desc = snapshot.get(heap.identity(&shared)).unwrap();
    assert_eq!(desc.sources.len(), 2);
    assert!(desc.is_retained_by(heap.identity(&left)));
    assert!(desc.is_retained_by(heap.identity(&right)));
}

#[test]
fn test_scalars_are_not_recorded() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    heap.set(&globals, "n", 42.0.into()).unwrap();
    heap.set(&globals, "s", "text".into()).unwrap();
    heap.set(&globals, "b", true.into()).unwrap();

    assert_eq!(walk(&heap).len(), 3);
}

#[test]
fn test_table_key_edge() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let set = heap.new_table();
    let member = heap.new_table();
    heap.set(&globals, "set", set.clone()).unwrap();
    heap.set(&set, member.clone(), true.into()).unwrap();

    let snapshot = walk(&heap);
    let desc = snapshot.get(heap.identity(&member)).unwrap();
    assert_eq!(
        desc.sources,
        vec![MarkSource::new(heap.identity(&set), "[key]", SourceKind::TableKey)]
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Weak tables
// ────────────────────────────────────────────────────────────────────────────

fn weak_table(heap: &mut ScriptHeap, mode: Value) -> Value {
    let globals = heap.globals();
    let table = heap.new_table();
    let mt = heap.new_table();
    heap.set(&mt, "__mode", mode).unwrap();
    heap.set_metatable(&table, Some(&mt)).unwrap();
    heap.set(&globals, "cache", table.clone()).unwrap();
    table
}

#[test]
fn test_weak_values_skip_value_edge() {
    let mut heap = ScriptHeap::new();
    let cache = weak_table(&mut heap, "v".into());
    let key = heap.new_table();
    let value = heap.new_table();
    heap.set(&cache, key.clone(), value.clone()).unwrap();

    let snapshot = walk(&heap);
    assert!(!snapshot.contains(heap.identity(&value)));
    let key_desc = snapshot.get(heap.identity(&key)).unwrap();
    assert_eq!(key_desc.sources[0].kind, SourceKind::TableKey);
}

#[test]
fn test_weak_keys_skip_key_edge() {
    let mut heap = ScriptHeap::new();
    let cache = weak_table(&mut heap, "k".into());
    let key = heap.new_table();
    let value = heap.new_table();
    heap.set(&cache, key.clone(), value.clone()).unwrap();

    let snapshot = walk(&heap);
    assert!(!snapshot.contains(heap.identity(&key)));
    let value_desc = snapshot.get(heap.identity(&value)).unwrap();
    assert_eq!(value_desc.sources[0].kind, SourceKind::TableValue);
    assert!(value_desc.sources[0].description.starts_with("table: "));
}

#[test]
fn test_fully_weak_table() {
    let mut heap = ScriptHeap::new();
    let cache = weak_table(&mut heap, "kv".into());
    let key = heap.new_table();
    let value = heap.new_table();
    heap.set(&cache, key.clone(), value.clone()).unwrap();

    let snapshot = walk(&heap);
    assert!(snapshot.contains(heap.identity(&cache)));
    assert!(!snapshot.contains(heap.identity(&key)));
    assert!(!snapshot.contains(heap.identity(&value)));
}

#[test]
fn test_weak_object_still_reachable_elsewhere() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let cache = weak_table(&mut heap, "v".into());
    let entry = heap.new_table();
    heap.set(&cache, "entry", entry.clone()).unwrap();
    heap.set(&globals, "strong", entry.clone()).unwrap();

    let snapshot = walk(&heap);
    let desc = snapshot.get(heap.identity(&entry)).unwrap();
    assert!(!desc.is_retained_by(heap.identity(&cache)));
    assert!(desc.is_retained_by(heap.identity(&globals)));
}

#[test]
fn test_non_string_mode_is_not_weak() {
    let mut heap = ScriptHeap::new();
    let cache = weak_table(&mut heap, 1.0.into());
    let value = heap.new_table();
    heap.set(&cache, "v", value.clone()).unwrap();

    assert!(walk(&heap).contains(heap.identity(&value)));
}

#[test]
fn test_weak_tables_ignored_when_disabled() {
    let mut heap = ScriptHeap::new();
    let cache = weak_table(&mut heap, "kv".into());
    let key = heap.new_table();
    let value = heap.new_table();
    heap.set(&cache, key.clone(), value.clone()).unwrap();

    let options = WalkOptions {
        honor_weak_tables: false,
        ..WalkOptions::default()
    };
    let snapshot = Snapshot::take(&heap, &heap.registry(), &options);
    assert!(snapshot.contains(heap.identity(&key)));
    assert!(snapshot.contains(heap.identity(&value)));
}

// ────────────────────────────────────────────────────────────────────────────
// Rendering
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_metatable_name_prefix() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let point = heap.new_table();
    let mt = heap.new_table();
    heap.set(&mt, "__name", "Point".into()).unwrap();
    heap.set_metatable(&point, Some(&mt)).unwrap();
    heap.set(&globals, "p", point.clone()).unwrap();

    let snapshot = walk(&heap);
    let desc = snapshot.get(heap.identity(&point)).unwrap();
    assert_eq!(desc.value, format!("Point: table: {}", heap.identity(&point)));

    let mt_desc = snapshot.get(heap.identity(&mt)).unwrap();
    assert_eq!(mt_desc.sources[0].description, "[metatable]");
    assert_eq!(mt_desc.sources[0].kind, SourceKind::Metatable);
}

#[test]
fn test_unrepresentable_value_gets_placeholder() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let broken = heap.new_table();
    let mt = heap.new_table();
    let tostring = heap.new_native(Vec::new());
    heap.set(&mt, "__tostring", tostring).unwrap();
    heap.set_metatable(&broken, Some(&mt)).unwrap();
    heap.set(&globals, "broken", broken.clone()).unwrap();
    let child = heap.new_table();
    heap.set(&broken, broken.clone(), child.clone()).unwrap();

    let snapshot = walk(&heap);
    let desc = snapshot.get(heap.identity(&broken)).unwrap();
    assert_eq!(desc.value, "<unrepresentable table>");

    // The walk continued past the bad value, into its children
    let child_desc = snapshot.get(heap.identity(&child)).unwrap();
    assert_eq!(child_desc.sources[0].description, "<unrepresentable table>");
}

#[test]
fn test_custom_placeholder() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let broken = heap.new_userdata();
    let mt = heap.new_table();
    let tostring = heap.new_table();
    heap.set(&mt, "__tostring", tostring).unwrap();
    heap.set_metatable(&broken, Some(&mt)).unwrap();
    heap.set(&globals, "u", broken.clone()).unwrap();

    let options = WalkOptions {
        placeholder: Some("???".to_string()),
        ..WalkOptions::default()
    };
    let snapshot = Snapshot::take(&heap, &heap.registry(), &options);
    assert_eq!(snapshot.get(heap.identity(&broken)).unwrap().value, "???");
}

#[test]
fn test_tostring_text_is_used() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let v = heap.new_table();
    let mt = heap.new_table();
    heap.set(&mt, "__name", "Vec2".into()).unwrap();
    heap.set(&mt, "__tostring", "Vec2: (1, 2)".into()).unwrap();
    heap.set_metatable(&v, Some(&mt)).unwrap();
    heap.set(&globals, "v", v.clone()).unwrap();

    let snapshot = walk(&heap);
    // Already prefixed by its own name, not prefixed twice
    assert_eq!(snapshot.get(heap.identity(&v)).unwrap().value, "Vec2: (1, 2)");
}

// ────────────────────────────────────────────────────────────────────────────
// Userdata and functions
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_userdata_metatable_and_user_value() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let ud = heap.new_userdata();
    let mt = heap.new_table();
    let payload = heap.new_table();
    heap.set(&mt, "__name", "Sprite".into()).unwrap();
    heap.set_metatable(&ud, Some(&mt)).unwrap();
    heap.set_user_value(&ud, payload.clone()).unwrap();
    heap.set(&globals, "sprite", ud.clone()).unwrap();

    let snapshot = walk(&heap);
    let ud_id = heap.identity(&ud);
    let desc = snapshot.get(ud_id).unwrap();
    assert_eq!(desc.kind, ObjectKind::UserData);
    assert_eq!(desc.value, format!("Sprite: userdata: {}", ud_id));

    assert_eq!(
        snapshot.get(heap.identity(&mt)).unwrap().sources,
        vec![MarkSource::new(ud_id, "[userdata metatable Sprite]", SourceKind::Metatable)]
    );
    assert_eq!(
        snapshot.get(heap.identity(&payload)).unwrap().sources,
        vec![MarkSource::new(ud_id, "[uservalue]", SourceKind::UserValue)]
    );
}

#[test]
fn test_light_userdata_is_leaf() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    heap.set(&globals, "handle", Value::LightUserData(0xdead_0000)).unwrap();

    let snapshot = walk(&heap);
    let desc = snapshot.get(memsnap_core::HeapId::new(0xdead_0000)).unwrap();
    assert_eq!(desc.kind, ObjectKind::LightUserData);
    assert_eq!(desc.value, "userdata: 0xdead0000");
    assert_eq!(desc.sources[0].description, "handle");
}

#[test]
fn test_function_upvalues_and_sources() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let state = heap.new_table();
    let anon = heap.new_table();
    let script = heap.new_function(
        "game.lua",
        12,
        vec![(Some("state".to_string()), state.clone()), (None, anon.clone())],
    );
    let native = heap.new_native(Vec::new());
    heap.set(&globals, "update", script.clone()).unwrap();
    heap.set(&globals, "print", native.clone()).unwrap();

    let snapshot = walk(&heap);
    let script_id = heap.identity(&script);
    let script_desc = snapshot.get(script_id).unwrap();
    assert_eq!(script_desc.value, format!("function: {} (game.lua:12)", script_id));

    let native_desc = snapshot.get(heap.identity(&native)).unwrap();
    assert!(native_desc.value.ends_with(" (cfunction)"));

    assert_eq!(
        snapshot.get(heap.identity(&state)).unwrap().sources,
        vec![MarkSource::new(script_id, "state", SourceKind::Upvalue)]
    );
    assert_eq!(
        snapshot.get(heap.identity(&anon)).unwrap().sources,
        vec![MarkSource::new(script_id, "[upvalue]", SourceKind::Upvalue)]
    );
}

#[test]
fn test_function_sources_disabled() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let f = heap.new_function("game.lua", 3, Vec::new());
    heap.set(&globals, "f", f.clone()).unwrap();

    let options = WalkOptions {
        function_sources: false,
        ..WalkOptions::default()
    };
    let snapshot = Snapshot::take(&heap, &heap.registry(), &options);
    assert_eq!(
        snapshot.get(heap.identity(&f)).unwrap().value,
        format!("function: {}", heap.identity(&f))
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Threads
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_suspended_thread_stack_and_locals() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let co = heap.new_thread();
    heap.set(&globals, "worker", co.clone()).unwrap();

    let on_stack = heap.new_table();
    let held = heap.new_table();
    heap.push(&co, 7.0.into()).unwrap();
    heap.push(&co, on_stack.clone()).unwrap();
    heap.push_frame(&co, "worker.lua", Some(40)).unwrap();
    heap.set_local(&co, 0, "held", held.clone()).unwrap();

    let snapshot = walk(&heap);
    let co_id = heap.identity(&co);
    assert_eq!(
        snapshot.get(co_id).unwrap().value,
        format!("thread: {} (worker.lua:40)", co_id)
    );
    assert_eq!(
        snapshot.get(heap.identity(&on_stack)).unwrap().sources,
        vec![MarkSource::new(co_id, "[2]", SourceKind::StackSlot)]
    );
    assert_eq!(
        snapshot.get(heap.identity(&held)).unwrap().sources,
        vec![MarkSource::new(co_id, "held : worker.lua:40", SourceKind::StackSlot)]
    );
}

#[test]
fn test_running_thread_walks_only_locals() {
    let mut heap = ScriptHeap::new();
    let main = heap.main_thread();
    let on_stack = heap.new_table();
    let local = heap.new_table();
    heap.push(&main, on_stack.clone()).unwrap();
    heap.push_frame(&main, "main.lua", None).unwrap();
    heap.set_local(&main, 0, "tmp", local.clone()).unwrap();

    let snapshot = walk(&heap);
    assert!(!snapshot.contains(heap.identity(&on_stack)));
    assert_eq!(descriptions(&snapshot, &heap, &local), vec!["tmp : main.lua:-1"]);

    // Once another thread runs, the main stack is walked too
    let other = heap.new_thread();
    heap.set_running(&other).unwrap();
    let snapshot = walk(&heap);
    assert_eq!(descriptions(&snapshot, &heap, &on_stack), vec!["[1]"]);
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshots and diffs
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_walk_is_idempotent() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let t = heap.new_table();
    heap.set(&globals, "t", t.clone()).unwrap();
    heap.set(&t, "self", t.clone()).unwrap();

    let first = walk(&heap);
    let second = walk(&heap);
    assert_eq!(first.ids().collect::<Vec<_>>(), second.ids().collect::<Vec<_>>());
    assert!(Snapshot::diff(&first, &second).is_empty());
}

#[test]
fn test_diff_after_allocation() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let before = walk(&heap);

    let x = heap.new_table();
    heap.set(&globals, "x", x.clone()).unwrap();
    let after = walk(&heap);

    let diff = Snapshot::diff(&before, &after);
    assert_eq!(diff.len(), 1);
    assert!(diff.contains(heap.identity(&x)));
    for id in before.ids() {
        assert!(!diff.contains(id));
    }
}

#[test]
fn test_reused_identity_hidden_from_diff() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let old = heap.new_table();
    heap.set(&globals, "old", old.clone()).unwrap();
    let before = walk(&heap);

    heap.set(&globals, "old", Value::Nil).unwrap();
    heap.free(&old).unwrap();
    let new = heap.new_userdata();
    heap.set(&globals, "new", new.clone()).unwrap();
    let after = walk(&heap);

    // Same address, different object: identity is the only comparison key
    assert_eq!(heap.identity(&old), heap.identity(&new));
    assert!(Snapshot::diff(&before, &after).is_empty());
}

#[test]
fn test_store_diff_to_file() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let mut store = SnapshotStore::default();
    let before = store.take(&heap, &heap.registry());

    let leak = heap.new_table();
    heap.set(&globals, "leak", leak.clone()).unwrap();
    let after = store.take(&heap, &heap.registry());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diff.txt");
    let diff = store
        .diff_to_file(before, after, &path, ReportFormat::Text)
        .unwrap();
    assert_eq!(diff.len(), 1);

    let report = std::fs::read_to_string(&path).unwrap();
    assert_eq!(report, format!("=========\ntable: {}\n\tleak\n", heap.identity(&leak)));
}

#[test]
fn test_report_lists_every_edge() {
    let mut heap = ScriptHeap::new();
    let globals = heap.globals();
    let shared = heap.new_table();
    heap.set(&globals, "a", shared.clone()).unwrap();
    heap.set(&globals, "b", shared.clone()).unwrap();

    let snapshot = walk(&heap);
    let text = report_text(&snapshot);
    assert_eq!(text.matches("=========\n").count(), snapshot.len());
    assert!(text.contains(&format!("table: {}\n\ta\n\tb\n", heap.identity(&shared))));
}
