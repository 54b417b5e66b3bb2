//! Tests for envelope decoding, identity filters and payload shapes.

use serde_json::json;

use crate::action::Action;
use crate::action::Reply;
use crate::envelope::Envelope;
use crate::envelope::MessageId;
use crate::error::Error;
use crate::identity::Identity;
use crate::identity::IdentityFilter;
use crate::payload::AddListenerRequest;
use crate::payload::ErrorPayload;
use crate::payload::InvokeRequest;
use crate::payload::InvokeResult;
use crate::topic;

// --- Actions ---

#[test]
fn test_action_names_round_trip() {
    for action in Action::ALL {
        assert_eq!(Action::parse(action.as_str()), Some(action));
    }
    assert_eq!(Action::parse("self-destruct"), None);
}

#[test]
fn test_action_reply_pairs() {
    assert_eq!(Action::Ping.reply(), Reply::Pong);
    assert_eq!(Action::Delete.reply().as_str(), "delete-result");
    assert_eq!(Action::Quit.reply().as_str(), "quit-received");
    assert_eq!(Action::AddListener.reply().as_str(), "add-listener-result");
    assert_eq!(Action::RemoveListener.reply().as_str(), "remove-listener-result");
}

// --- Envelope ---

#[test]
fn test_decode_string_message_id() {
    let env = Envelope::decode(r#"{"action":"ping","messageId":"p1","payload":{}}"#).unwrap();
    assert_eq!(env.request_action(), Some(Action::Ping));
    assert_eq!(env.message_id, MessageId::Text("p1".into()));
}

#[test]
fn test_numeric_message_id_is_echoed_as_number() {
    let env = Envelope::from_json(json!({"action": "ping", "messageId": 7, "payload": {}})).unwrap();
    assert_eq!(env.message_id, MessageId::Number(7));

    let reply = Envelope::reply(Reply::Pong, env.message_id.clone(), json!({}));
    assert_eq!(reply.to_json(), json!({"action": "pong", "messageId": 7, "payload": {}}));
}

#[test]
fn test_negative_and_fractional_message_ids_are_echoed() {
    for id in [json!(-3), json!(1.5)] {
        let env = Envelope::from_json(json!({"action": "ping", "messageId": id, "payload": {}})).unwrap();
        assert!(matches!(env.message_id, MessageId::Other(_)));

        let reply = Envelope::reply(Reply::Pong, env.message_id, json!({}));
        assert_eq!(reply.to_json()["messageId"], id);
    }
}

#[test]
fn test_missing_payload_defaults_to_null() {
    let env = Envelope::decode(r#"{"action":"quit","messageId":"q"}"#).unwrap();
    assert!(env.payload.is_null());
}

#[test]
fn test_unknown_action_survives_decoding() {
    let env = Envelope::decode(r#"{"action":"teleport","messageId":"x","payload":{}}"#).unwrap();
    assert_eq!(env.action, "teleport");
    assert_eq!(env.request_action(), None);
}

#[test]
fn test_envelope_without_message_id_is_rejected() {
    let err = Envelope::decode(r#"{"action":"ping","payload":{}}"#).unwrap_err();
    assert!(matches!(err, Error::MalformedEnvelope(_)));
}

#[test]
fn test_error_envelope_echoes_request_payload() {
    let request_payload = json!({"method": "fin.nothing", "proxyObjId": "proxy-9"});
    let env = Envelope::error("m1".into(), "invoke error, proxyObject removed already", request_payload.clone());

    assert!(env.is_error());
    let payload: ErrorPayload = serde_json::from_value(env.payload).unwrap();
    assert_eq!(payload.error, "invoke error, proxyObject removed already");
    assert_eq!(payload.request_payload, request_payload);
}

// --- Payloads ---

#[test]
fn test_invoke_request_defaults() {
    let env = Envelope::request(Action::Invoke, "m2", json!({"method": "fin.System.getVersion"}));
    let req: InvokeRequest = env.payload_as(Action::Invoke).unwrap();
    assert_eq!(req.method, "fin.System.getVersion");
    assert!(req.args.is_empty());
    assert!(req.proxy_obj_id.is_none());
    assert!(!req.proxy_result);
}

#[test]
fn test_add_listener_request_wire_names() {
    let payload = json!({
        "proxyObjId": "proxy-1",
        "method": "addListener",
        "args": ["closed"],
        "listenerArgIdx": 1,
        "iabTopic": "client-listener-0",
        "proxyResult": true,
    });
    let req: AddListenerRequest = serde_json::from_value(payload).unwrap();
    assert_eq!(req.proxy_obj_id.as_deref(), Some("proxy-1"));
    assert_eq!(req.listener_arg_idx, 1);
    assert_eq!(req.iab_topic, "client-listener-0");
    assert!(req.proxy_result);
}

#[test]
fn test_null_optionals_read_as_absent() {
    let req: InvokeRequest = serde_json::from_value(json!({
        "method": "math.add",
        "args": null,
        "proxyResult": null,
    }))
    .unwrap();
    assert!(req.args.is_empty());
    assert!(!req.proxy_result);

    let req: AddListenerRequest = serde_json::from_value(json!({
        "method": "on",
        "args": null,
        "listenerArgIdx": null,
        "iabTopic": "t",
        "proxyResult": null,
    }))
    .unwrap();
    assert!(req.args.is_empty());
    assert_eq!(req.listener_arg_idx, 0);
    assert!(!req.proxy_result);
}

#[test]
fn test_splice_index_follows_array_splice() {
    let at = |idx: i64, len: usize| {
        AddListenerRequest { listener_arg_idx: idx, ..AddListenerRequest::default() }.splice_index(len)
    };
    assert_eq!(at(0, 2), 0);
    assert_eq!(at(1, 2), 1);
    assert_eq!(at(9, 2), 2);
    assert_eq!(at(-1, 2), 1);
    assert_eq!(at(-2, 2), 0);
    assert_eq!(at(-9, 2), 0);
    assert_eq!(at(-1, 0), 0);
}

#[test]
fn test_malformed_payload_names_action() {
    let env = Envelope::request(Action::Invoke, "m3", json!({"args": []}));
    let err = env.payload_as::<InvokeRequest>(Action::Invoke).unwrap_err();
    assert!(err.to_string().starts_with("malformed invoke payload"));
}

#[test]
fn test_invoke_result_omits_absent_fields() {
    let empty = serde_json::to_value(InvokeResult::default()).unwrap();
    assert_eq!(empty, json!({}));

    let full = InvokeResult { result: Some(json!(3)), proxy_obj_id: Some("proxy-0".into()) };
    assert_eq!(serde_json::to_value(full).unwrap(), json!({"result": 3, "proxyObjId": "proxy-0"}));
}

// --- Identity ---

#[test]
fn test_identity_filters() {
    let source = Identity::new("app-a", "main");

    assert!(IdentityFilter::any().matches(&source));
    assert!(IdentityFilter::app("app-a").matches(&source));
    assert!(!IdentityFilter::app("app-b").matches(&source));
    assert!(IdentityFilter::exact(&source).matches(&source));
    assert!(!IdentityFilter::exact(&Identity::new("app-a", "popup")).matches(&source));
}

#[test]
fn test_topics() {
    let gateway = Identity::app("svc-gateway");
    assert_eq!(topic::exec_topic(&gateway), "svc-gateway-exec");
    assert_eq!(topic::listener_topic(&gateway, 3), "svc-gateway-listener-3");
}
