use std::sync::{Arc, Mutex};

use outline_state::codec::json;
use outline_state::{
    Editor, EditorConfig, EditorError, EditorState, NodeKey, NodeKind, NodeSchema, Point, PointKind, Selection,
    PARAGRAPH_TYPE,
};
use serde_json::{json, Map, Value};

const HELLO_WORLD: &str = r#"{"_nodeMap":[["root",{"__type":"root","__flags":0,"__key":"root","__parent":null,"__children":["1"],"__format":0,"__indent":0,"__cachedText":"Hello world"}],["1",{"__type":"paragraph","__flags":0,"__key":"1","__parent":"root","__children":["2"],"__format":0,"__indent":0}],["2",{"__type":"text","__flags":0,"__key":"2","__parent":"1","__text":"Hello world","__format":0,"__style":""}]],"_selection":{"anchor":{"key":"2","offset":6,"type":"text"},"focus":{"key":"2","offset":11,"type":"text"}}}"#;

fn paragraph(editor: &Editor, text: &str) -> (NodeKey, NodeKey) {
    editor
        .update(|tx| {
            let p = tx.create_element(PARAGRAPH_TYPE)?;
            let t = tx.create_text(text)?;
            tx.append(&p, &t)?;
            tx.append("root", &p)?;
            Ok((p, t))
        })
        .expect("paragraph update must commit")
}

#[test]
fn new_editor_holds_root_only_and_no_selection() {
    let editor = Editor::new();
    let state = editor.state();
    assert_eq!(state.len(), 1);
    assert_eq!(state.root().kind(), NodeKind::Root);
    assert!(state.root().children().is_empty());
    assert!(state.selection().is_none());
}

#[test]
fn append_then_read_back() {
    let editor = Editor::new();
    paragraph(&editor, "foo");

    editor.read(|state| {
        let root = state.root();
        assert_eq!(root.children(), [NodeKey::from("1")]);
        let p = state.get("1").expect("paragraph must exist");
        assert_eq!(p.node_type(), PARAGRAPH_TYPE);
        assert_eq!(p.children(), [NodeKey::from("2")]);
        let t = state.get("2").expect("text must exist");
        assert_eq!(t.text_payload(), Some("foo"));
        assert_eq!(t.parent(), Some(&NodeKey::from("1")));
        assert_eq!(state.text_content("1"), Some("foo"));
    });
}

#[test]
fn serializes_to_canonical_json() {
    let editor = Editor::new();
    editor
        .update(|tx| {
            let p = tx.create_element(PARAGRAPH_TYPE)?;
            let t = tx.create_text("Hello world")?;
            tx.append(&p, &t)?;
            tx.append("root", &p)?;
            tx.select_text(&t, 6, 11)
        })
        .expect("update must commit");

    let state = editor.state();
    assert_eq!(json::to_string(&state), HELLO_WORLD);

    let pretty = json::to_string_pretty(&state).expect("pretty output");
    assert!(pretty.starts_with("{\n  \"_nodeMap\": [\n    [\n      \"root\",\n      {\n        \"__type\": \"root\","));
    let reparsed: Value = serde_json::from_str(&pretty).expect("pretty output must parse");
    assert_eq!(reparsed, state.to_json());
}

#[test]
fn canonical_json_round_trips() {
    let editor = Editor::new();
    let state = editor.parse_state(HELLO_WORLD).expect("canonical text must parse");
    assert_eq!(json::to_string(&state), HELLO_WORLD);

    let selection = state.selection().expect("selection must survive parsing");
    assert_eq!(selection.anchor, Point::new("2", 6, PointKind::Text));
    assert_eq!(selection.focus, Point::new("2", 11, PointKind::Text));
    assert!(!selection.is_collapsed());

    editor.set_state(state.clone()).expect("set_state");
    assert_eq!(*editor.state(), state);
    let next = editor
        .update(|tx| tx.create_text("tail"))
        .expect("fresh key after load");
    assert_eq!(next, "3");
}

#[test]
fn removing_last_child_collects_subtree() {
    let editor = Editor::new();
    let (p, _) = paragraph(&editor, "foo");
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    editor.register_update_listener(move |event| {
        sink.lock().expect("sink").push(event.collected.clone());
    });

    editor.update(|tx| tx.remove(&p)).expect("remove must commit");

    let state = editor.state();
    assert_eq!(state.len(), 1);
    assert!(state.root().children().is_empty());
    assert_eq!(
        state.to_json(),
        json!({
            "_nodeMap": [["root", {
                "__type": "root", "__flags": 0, "__key": "root", "__parent": null,
                "__children": [], "__format": 0, "__indent": 0, "__cachedText": ""
            }]],
            "_selection": null
        })
    );
    assert_eq!(
        *events.lock().expect("events"),
        vec![vec![NodeKey::from("1"), NodeKey::from("2")]]
    );
}

#[test]
fn cascading_collection_of_nested_subtree() {
    let editor = Editor::new();
    let outer = editor
        .update(|tx| {
            let outer = tx.create_element(PARAGRAPH_TYPE)?;
            let inner = tx.create_element(PARAGRAPH_TYPE)?;
            let leaf = tx.create_text("deep")?;
            tx.append(&inner, &leaf)?;
            tx.append(&outer, &inner)?;
            tx.append("root", &outer)?;
            Ok(outer)
        })
        .expect("build");
    assert_eq!(editor.state().len(), 4);

    editor.update(|tx| tx.remove(&outer)).expect("remove");
    assert_eq!(editor.state().len(), 1);
    assert_eq!(editor.state().text(), "");
}

#[test]
fn old_states_are_never_mutated() {
    let editor = Editor::new();
    let (_, t) = paragraph(&editor, "before");
    let old = editor.state();
    let old_json = json::to_string(&old);

    editor
        .update(|tx| {
            tx.set_text(&t, "after")?;
            tx.select_text(&t, 0, 5)
        })
        .expect("edit");

    assert_eq!(json::to_string(&old), old_json);
    assert_eq!(old.text(), "before");
    assert!(old.selection().is_none());
    assert_eq!(editor.state().text(), "after");
}

#[test]
fn invalid_offset_is_rejected_without_clamping() {
    let editor = Editor::new();
    let (_, t) = paragraph(&editor, "abc");
    let before = editor.state();

    let err = editor
        .update(|tx| tx.select_text(&t, 0, 4))
        .expect_err("offset 4 is past the end of `abc`");
    assert!(matches!(err, EditorError::InvalidOffset { offset: 4, len: 3, .. }));
    assert!(Arc::ptr_eq(&before, &editor.state()));

    editor.update(|tx| tx.select_text(&t, 3, 3)).expect("end offset is valid");
    assert!(editor.state().selection().expect("caret").is_collapsed());
}

#[test]
fn selection_on_collected_node_becomes_null() {
    let editor = Editor::new();
    let (p, t) = paragraph(&editor, "abc");
    editor.update(|tx| tx.select_text(&t, 1, 2)).expect("select");
    editor.update(|tx| tx.remove(&p)).expect("remove");
    assert!(editor.state().selection().is_none());
}

#[test]
fn element_points_and_backward_selection() {
    let editor = Editor::new();
    let (_, first) = paragraph(&editor, "one");
    let (_, second) = paragraph(&editor, "two");
    editor
        .update(|tx| {
            tx.set_selection(Selection::new(
                Point::text(second.as_str(), 1),
                Point::text(first.as_str(), 2),
            ))
        })
        .expect("select across paragraphs");
    assert!(editor.state().is_selection_backward());

    editor
        .update(|tx| tx.set_selection(Selection::collapsed(Point::element("root", 2))))
        .expect("element point at end of root");
    let err = editor
        .update(|tx| tx.set_anchor(Point::element("root", 3)))
        .expect_err("root has two children");
    assert!(matches!(err, EditorError::InvalidOffset { len: 2, .. }));
}

#[test]
fn moving_a_node_keeps_a_single_parent() {
    let editor = Editor::new();
    let (p1, t) = paragraph(&editor, "x");
    let (p2, _) = paragraph(&editor, "y");

    editor.update(|tx| tx.append(&p2, &t)).expect("move");
    let state = editor.state();
    assert!(state.get(&p1).expect("p1").children().is_empty());
    assert_eq!(state.get(&p2).expect("p2").children().len(), 2);
    assert_eq!(state.get(&t).expect("t").parent(), Some(&p2));
    assert_eq!(state.text(), "yx");
}

#[test]
fn cycle_rejection_aborts_whole_update() {
    let editor = Editor::new();
    let (p, _) = paragraph(&editor, "x");
    let before = editor.state();
    let err = editor
        .update(|tx| {
            let inner = tx.create_element(PARAGRAPH_TYPE)?;
            tx.append(&p, &inner)?;
            tx.append(&inner, &p)
        })
        .expect_err("cycle");
    assert!(matches!(err, EditorError::StructuralIntegrity(_)));
    assert!(Arc::ptr_eq(&before, &editor.state()));
}

#[test]
fn update_events_carry_diff() {
    let editor = Editor::new();
    let (_, t) = paragraph(&editor, "a");
    let diffs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&diffs);
    editor.register_update_listener(move |event| {
        sink.lock().expect("sink").push(event.diff());
    });

    editor.update(|tx| tx.set_text(&t, "b")).expect("edit");
    let diffs = diffs.lock().expect("diffs");
    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].added.is_empty());
    assert!(diffs[0].removed.is_empty());
    assert_eq!(diffs[0].updated, vec![t]);
}

#[test]
fn malformed_input_is_rejected() {
    let editor = Editor::new();
    let mut doc: Value = serde_json::from_str(HELLO_WORLD).expect("fixture");
    doc["_nodeMap"][1][1]["__children"] = json!(["2", "5"]);
    let err = json::decode(&doc, editor.registry()).expect_err("dangling child");
    assert!(matches!(err, EditorError::MalformedState(_)));

    let err = editor.parse_state("{\"_nodeMap\":[]}").expect_err("no root");
    assert!(matches!(err, EditorError::MalformedState(_)));

    let err = editor.parse_state("not json").expect_err("syntax");
    assert!(matches!(err, EditorError::Json(_)));
}

#[test]
fn configured_node_types_serialize_extension_fields() {
    let config = EditorConfig::default()
        .with_namespace("notes")
        .with_node_type(NodeSchema::new("heading", NodeKind::Element).required("tag"));
    let editor = Editor::with_config(config).expect("config");

    editor
        .update(|tx| {
            let mut fields = Map::new();
            fields.insert("tag".into(), json!("h1"));
            let h = tx.create_node("heading", fields)?;
            let t = tx.create_text("Title")?;
            tx.append(&h, &t)?;
            tx.append("root", &h)
        })
        .expect("heading");

    let text = json::to_string(&editor.state());
    assert!(text.contains(r#""__children":["2"],"__format":0,"__indent":0,"__tag":"h1"}"#));

    let parsed = editor.parse_state(&text).expect("round trip");
    assert_eq!(parsed.get("1").expect("heading").field("tag"), Some(&json!("h1")));
    assert!(Editor::new().parse_state(&text).is_err());
}

#[test]
fn bootstrapped_state_is_validated() {
    let state = EditorState::empty();
    let editor = Editor::new().with_initial_state(state.clone());
    assert_eq!(*editor.state(), state);
    assert_eq!(editor.config().namespace, "outline");
}

#[test]
fn deeply_nested_documents_read_and_serialize() {
    const DEPTH: usize = 20_000;
    let editor = Editor::new();
    editor
        .update(|tx| {
            let mut top = tx.create_text("bottom")?;
            for _ in 0..DEPTH {
                let parent = tx.create_element(PARAGRAPH_TYPE)?;
                tx.append(&parent, &top)?;
                top = parent;
            }
            tx.append("root", &top)
        })
        .expect("deep chain must commit");

    let state = editor.state();
    assert_eq!(state.len(), DEPTH + 2);
    assert_eq!(state.text(), "bottom");
    let text = json::to_string(&state);
    assert!(text.contains(r#""__cachedText":"bottom""#));

    let parsed = editor.parse_state(&text).expect("deep chain must parse");
    assert_eq!(parsed.text(), "bottom");
    assert_eq!(json::to_string(&parsed), text);
}
