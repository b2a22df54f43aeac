use pairlab_common::protocol::event::{EventKind, RelayEvent};
use serde_json::{json, Value};

#[test]
fn wire_contract_every_kind_serializes_to_its_wire_string() {
    let expected = [
        "code-change",
        "cursor-move",
        "file-create",
        "file-delete",
        "chat-message",
        "session-join",
        "session-leave",
        "terminal-output",
        "terminal-input",
    ];

    let kinds = [
        EventKind::CodeChange,
        EventKind::CursorMove,
        EventKind::FileCreate,
        EventKind::FileDelete,
        EventKind::ChatMessage,
        EventKind::SessionJoin,
        EventKind::SessionLeave,
        EventKind::TerminalOutput,
        EventKind::TerminalInput,
    ];

    for (kind, wire) in kinds.into_iter().zip(expected) {
        let value = serde_json::to_value(kind).expect("kind should serialize");
        assert_eq!(value, json!(wire), "wire string for {kind:?} must stay stable");
    }
}

#[test]
fn wire_contract_envelope_shape_matches_clients() {
    let samples = [
        (
            RelayEvent {
                kind: EventKind::CodeChange,
                session_id: 7,
                sender_id: 1,
                payload: json!({ "fileId": 10, "content": "x=1" }),
            },
            "code-change",
        ),
        (
            RelayEvent {
                kind: EventKind::ChatMessage,
                session_id: 7,
                sender_id: 2,
                payload: json!({ "text": "hi", "sentAt": "2026-08-06T12:00:00Z" }),
            },
            "chat-message",
        ),
        (RelayEvent::synthesized_leave(7, 1), "session-leave"),
    ];

    for (event, expected_kind) in samples {
        let value = serde_json::to_value(&event).expect("envelope should serialize");
        assert_eq!(value["kind"], expected_kind);
        for key in ["kind", "sessionId", "senderId", "payload"] {
            assert!(
                value.get(key).is_some(),
                "serialized `{expected_kind}` envelope must include `{key}`",
            );
        }
        assert_eq!(object_keys(&value).len(), 4, "envelope must carry exactly four keys");
    }
}

#[test]
fn wire_contract_payload_survives_decode_reencode_verbatim() {
    // The relay fans envelopes out unmodified; a decode/re-encode round
    // trip must preserve arbitrary payload structure clients send.
    let raw = json!({
        "kind": "terminal-output",
        "sessionId": 42,
        "senderId": 9,
        "payload": { "data": "cargo test\n", "ansi": true, "chunk": [1, 2, 3] }
    });

    let event: RelayEvent =
        serde_json::from_value(raw.clone()).expect("envelope should deserialize");
    let reencoded = serde_json::to_value(&event).expect("envelope should reserialize");
    assert_eq!(reencoded, raw);
}

fn object_keys(value: &Value) -> Vec<String> {
    let mut keys =
        value.as_object().expect("value should be an object").keys().cloned().collect::<Vec<_>>();
    keys.sort();
    keys
}
