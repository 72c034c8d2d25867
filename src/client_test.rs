use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use super::test_helpers::{URL, harness, harness_with};
use super::*;
use crate::error::{CONNECTION_CLOSED, SESSION_EXPIRED};
use crate::store::session_key;

fn persisted(session_id: &str) -> MemoryStore {
    MemoryStore::with(session_key(URL), session_id)
}

// =============================================================================
// INIT
// =============================================================================

#[test]
fn init_without_persisted_session_signs_out() {
    let h = harness();
    let mut init = h.connect();

    assert!(init.try_take().expect("resolved").expect("init ok").is_none());
    assert_eq!(h.client.phase(), SessionPhase::SignedOut);
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
    assert!(h.transport.sent().is_empty());
}

#[test]
fn init_validates_persisted_session() {
    let h = harness_with(persisted("s-1"));
    let mut init = h.connect();

    let call = h.last_call();
    assert_eq!(call.api, "ValidateSession");
    assert_eq!(call.seq, 0);
    assert_eq!(call.body, r#"{"session_id":"s-1"}"#);
    assert_eq!(h.client.phase(), SessionPhase::AwaitingValidation);
    assert!(init.try_take().is_none());

    h.deliver(r#"R:0:{"user_id":"u1","username":"alice","session_id":"s-1","time":0}"#);

    let user = init.try_take().expect("resolved").expect("init ok").expect("signed in");
    assert_eq!(user.user_id, "u1");
    assert_eq!(h.client.phase(), SessionPhase::SignedIn);
    assert_eq!(h.client.session_id().as_deref(), Some("s-1"));
    assert_eq!(h.client.user_info().expect("user").username.as_deref(), Some("alice"));
    assert_eq!(h.transport.authorized().as_deref(), Some("s-1"));
}

#[test]
fn init_with_rejected_session_signs_out_and_reports() {
    let h = harness_with(persisted("s-1"));
    let mut init = h.connect();

    h.deliver(r#"E:0:{"errorCode":3,"errorMessage":"bad session","errorDetails":""}"#);

    let err = init.try_take().expect("resolved").expect_err("init should fail");
    assert_eq!(err.code(), Some(3));
    assert_eq!(h.client.phase(), SessionPhase::SignedOut);
    assert!(h.client.session_id().is_none());
    assert!(h.store.load(&session_key(URL)).is_none());
}

#[test]
fn connection_lost_during_validation_keeps_persisted_session() {
    let h = harness_with(persisted("s-1"));
    let mut init = h.connect();
    assert_eq!(h.last_call().api, "ValidateSession");

    h.transport.sink().closed(Some("network blip".into()));
    h.client.tick();

    let err = init.try_take().expect("resolved").expect_err("init should fail");
    assert!(matches!(err, ClientError::ConnectionClosed(_)));
    assert_eq!(h.store.load(&session_key(URL)).as_deref(), Some("s-1"));

    // The next connection validates the same session again.
    let _retry = h.connect();
    let call = h.last_call();
    assert_eq!(call.api, "ValidateSession");
    assert_eq!(call.body, r#"{"session_id":"s-1"}"#);
}

#[test]
fn local_close_during_validation_keeps_persisted_session() {
    let h = harness_with(persisted("s-1"));
    let mut init = h.connect();

    h.client.close();

    assert!(matches!(init.try_take(), Some(Err(ClientError::ConnectionClosed(_)))));
    assert_eq!(h.store.load(&session_key(URL)).as_deref(), Some("s-1"));
    assert_eq!(h.client.session_id().as_deref(), Some("s-1"));
}

#[test]
fn init_connect_failure_stays_uninitialized() {
    let h = harness();
    let mut init = h.client.init();
    h.transport.sink().failed("connection refused");
    h.client.tick();

    let err = init.try_take().expect("resolved").expect_err("init should fail");
    assert!(matches!(err, ClientError::Network(ref r) if r.error_details == "connection refused"));
    assert_eq!(h.client.phase(), SessionPhase::Uninitialized);
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn init_with_unknown_scheme_fails_immediately() {
    let client = Client::new("gopher://example.test");
    let mut init = client.init();
    let err = init.try_take().expect("resolved").expect_err("should fail");
    assert!(matches!(err, ClientError::UnsupportedUrl(_)));
}

// =============================================================================
// SWITCH HOST
// =============================================================================

#[test]
fn switch_to_same_host_is_immediate_noop() {
    let h = harness();
    let _init = h.connect();

    let mut switched = h.client.switch_host(URL);

    assert!(switched.try_take().expect("resolved").is_ok());
    assert_eq!(h.connects(), 1);
    assert_eq!(h.transport.closes(), 0);
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
}

#[test]
fn switch_to_other_host_reconnects() {
    let h = harness();
    let _init = h.connect();
    let mut outstanding: Pending<Value> = h.client.call("GetTime", &json!({}));

    let mut switched = h.client.switch_host("ws://other.test");
    assert_eq!(h.transport.closes(), 1);
    assert_eq!(h.connects(), 2);
    assert_eq!(h.client.server_url(), "ws://other.test");
    assert!(matches!(outstanding.try_take(), Some(Err(ClientError::ConnectionClosed(_)))));

    h.transport.sink().opened();
    h.client.tick();
    assert!(switched.try_take().expect("resolved").is_ok());
    assert_eq!(h.client.phase(), SessionPhase::SignedOut);
}

// =============================================================================
// CALLS
// =============================================================================

#[test]
fn call_round_trip() {
    let h = harness();
    let _init = h.connect();

    let mut pending: Pending<crate::messages::ServerTime> = h.client.call("GetTime", &json!({}));
    assert_eq!(h.transport.sent(), vec!["GetTime:0:{}"]);
    assert_eq!(h.client.outstanding_calls(), 1);

    h.deliver(r#"R:0:{"time":1234.5}"#);
    let time = pending.try_take().expect("resolved").expect("ok");
    assert!((time.time - 1234.5).abs() < f64::EPSILON);
    assert_eq!(h.client.outstanding_calls(), 0);
}

#[test]
fn interleaved_replies_complete_their_own_calls() {
    let h = harness();
    let _init = h.connect();

    let mut calls: Vec<Pending<Value>> = (0..20).map(|_| h.client.call("Echo", &json!({}))).collect();
    for seq in [7_u64, 0, 19, 3, 12, 1, 18, 5, 9, 14, 2, 16, 4, 11, 8, 15, 6, 17, 10, 13] {
        h.transport.sink().message(format!(r#"R:{seq}:{{"n":{seq}}}"#));
    }
    assert_eq!(h.client.tick(), 20);

    for (seq, call) in calls.iter_mut().enumerate() {
        let reply = call.try_take().expect("resolved").expect("ok");
        assert_eq!(reply["n"], json!(seq));
    }
}

#[test]
fn reply_with_wrong_shape_fails_the_call() {
    let h = harness();
    let _init = h.connect();

    let mut pending: Pending<crate::messages::ServerTime> = h.client.call("GetTime", &json!({}));
    h.deliver(r#"R:0:{"time":"noon"}"#);

    assert!(matches!(pending.try_take(), Some(Err(ClientError::InvalidReply(_)))));
}

#[test]
fn error_reply_goes_to_the_call_only() {
    let h = harness();
    let _init = h.connect();
    let global = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&global);
    h.client.on_error(Some(Arc::new(move |_: &ErrorReply| {
        seen.fetch_add(1, Ordering::SeqCst);
    })));

    let mut pending: Pending<Value> = h.client.call("SetUserKey", &json!({}));
    h.deliver(r#"E:0:{"errorCode":12,"errorMessage":"denied","errorDetails":"nope"}"#);

    let err = pending.try_take().expect("resolved").expect_err("should fail");
    assert!(matches!(err, ClientError::Application(ref r) if r.error_code == 12 && r.error_details == "nope"));
    assert_eq!(global.load(Ordering::SeqCst), 0);
}

#[test]
fn server_sent_local_code_is_an_application_error() {
    let h = harness();
    let _init = h.connect();

    let mut pending: Pending<Value> = h.client.call("GetTime", &json!({}));
    h.deliver(r#"E:0:{"errorCode":-1,"errorMessage":"relay dropped","errorDetails":""}"#);

    let err = pending.try_take().expect("resolved").expect_err("should fail");
    assert!(matches!(err, ClientError::Application(ref r) if r.error_code == CONNECTION_CLOSED));
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
}

#[test]
fn send_failure_fails_the_call_immediately() {
    let h = harness();
    let _init = h.connect();
    h.transport.fail_sends.store(true, Ordering::SeqCst);

    let mut pending: Pending<Value> = h.client.call("GetTime", &json!({}));

    assert!(matches!(pending.try_take(), Some(Err(ClientError::Network(_)))));
    assert_eq!(h.client.outstanding_calls(), 0);
}

#[test]
fn api_name_with_delimiter_fails_without_sending() {
    let h = harness();
    let _init = h.connect();

    let mut pending: Pending<Value> = h.client.call("Get:Time", &json!({}));

    let err = pending.try_take().expect("resolved").expect_err("unencodable api");
    assert!(matches!(err, ClientError::Network(ref r) if r.error_details.contains("Get:Time")));
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.client.outstanding_calls(), 0);
}

#[test]
fn call_before_init_is_a_network_error() {
    let h = harness();
    let mut pending: Pending<Value> = h.client.call("GetTime", &json!({}));
    assert!(matches!(pending.try_take(), Some(Err(ClientError::Network(_)))));
}

#[test]
fn sign_in_adopts_and_persists_session() {
    let h = harness();
    let _init = h.connect();

    let mut pending = h.client.sign_in_with(Some("alice"), None, "pw");
    let call = h.last_call();
    assert_eq!(call.api, "SignIn");
    let body: Value = serde_json::from_str(&call.body).expect("json");
    assert_eq!(body["username"], "alice");

    h.deliver(r#"R:0:{"user_id":"u1","session_id":"s-9","time":0}"#);
    assert_eq!(pending.try_take().expect("resolved").expect("ok").session_id, "s-9");
    assert_eq!(h.client.phase(), SessionPhase::SignedIn);
    assert!(h.client.is_signed_in());
    assert_eq!(h.store.load(&session_key(URL)).as_deref(), Some("s-9"));
    assert_eq!(h.transport.authorized().as_deref(), Some("s-9"));

    h.client.sign_out();
    assert_eq!(h.client.phase(), SessionPhase::SignedOut);
    assert!(h.store.load(&session_key(URL)).is_none());
    assert!(h.transport.authorized().is_none());
}

// =============================================================================
// KEEPALIVE
// =============================================================================

#[test]
fn ping_is_debounced_by_the_last_send() {
    let h = harness();
    let _init = h.connect();

    assert!(h.client.ping().is_some(), "nothing sent yet");
    assert_eq!(h.transport.sent().len(), 1);

    h.clock.advance(Duration::from_millis(3_990));
    assert!(h.client.ping().is_none());
    assert_eq!(h.transport.sent().len(), 1);

    h.clock.advance(Duration::from_millis(10));
    assert!(h.client.ping().is_some());
    assert_eq!(h.transport.sent().len(), 2);
    assert_eq!(h.last_call().api, "GetTime");
}

#[test]
fn ping_requires_a_connection() {
    let h = harness();
    assert!(h.client.ping().is_none());
}

#[test]
fn ping_reply_recalibrates_server_time() {
    let h = harness();
    let _init = h.connect();
    assert!(h.client.server_time().is_none());

    let mut ping = h.client.ping().expect("ping sent");
    h.deliver(r#"R:0:{"time":5000000}"#);
    ping.try_take().expect("resolved").expect("ok");

    h.clock.advance(Duration::from_millis(1_500));
    let estimate = h.client.server_time().expect("server time");
    assert!((estimate - 5_001_500.0).abs() < 1e-6, "{estimate}");
}

// =============================================================================
// CLOSE & EXPIRY
// =============================================================================

#[test]
fn session_expiry_closes_once() {
    let h = harness_with(persisted("s-1"));
    let _init = h.connect();
    h.deliver(r#"R:0:{"user_id":"u1","session_id":"s-1"}"#);
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&errors);
    h.client.on_error(Some(Arc::new(move |reply: &ErrorReply| {
        assert_eq!(reply.error_code, SESSION_EXPIRED);
        seen.fetch_add(1, Ordering::SeqCst);
    })));
    let mut outstanding: Pending<Value> = h.client.call("GetTime", &json!({}));

    let push = format!(r#"M:error:server::{{"errorCode":{SESSION_EXPIRED},"errorMessage":"expired"}}"#);
    h.transport.sink().message(push.clone());
    h.transport.sink().message(push);
    h.client.tick();
    h.client.expire();

    assert_eq!(h.transport.closes(), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(h.client.phase(), SessionPhase::Closed);
    assert_eq!(h.client.connection_state(), ConnectionState::Closed);
    assert!(h.client.session_id().is_none());
    assert!(h.store.load(&session_key(URL)).is_none());
    assert!(matches!(outstanding.try_take(), Some(Err(ClientError::ConnectionClosed(_)))));
}

#[test]
fn expired_error_reply_fails_call_and_closes() {
    let h = harness();
    let _init = h.connect();
    let mut pending: Pending<Value> = h.client.call("GetUserKey", &json!({"key": "k"}));

    h.deliver(&format!(r#"E:0:{{"errorCode":{SESSION_EXPIRED},"errorMessage":"expired"}}"#));

    assert!(matches!(pending.try_take(), Some(Err(ClientError::SessionExpired(_)))));
    assert_eq!(h.client.phase(), SessionPhase::Closed);
    assert_eq!(h.transport.closes(), 1);
}

#[test]
fn peer_close_fails_outstanding_and_notifies() {
    let h = harness();
    let _init = h.connect();
    let codes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&codes);
    h.client.on_error(Some(Arc::new(move |reply: &ErrorReply| {
        seen.lock().expect("codes").push(reply.error_code);
    })));
    let mut outstanding: Pending<Value> = h.client.call("GetTime", &json!({}));

    h.transport.sink().closed(Some("going away".into()));
    h.transport.sink().closed(None);
    h.client.tick();

    assert!(matches!(outstanding.try_take(), Some(Err(ClientError::ConnectionClosed(_)))));
    assert_eq!(*codes.lock().expect("codes"), vec![CONNECTION_CLOSED]);
    assert_eq!(h.client.phase(), SessionPhase::Closed);
}

#[test]
fn local_close_fails_outstanding_without_notifying() {
    let h = harness();
    let _init = h.connect();
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&errors);
    h.client.on_error(Some(Arc::new(move |_: &ErrorReply| {
        seen.fetch_add(1, Ordering::SeqCst);
    })));
    let mut outstanding: Pending<Value> = h.client.call("GetTime", &json!({}));
    let old_sink = h.transport.sink();

    h.client.close();
    old_sink.closed(None);
    h.client.tick();

    assert!(matches!(outstanding.try_take(), Some(Err(ClientError::ConnectionClosed(_)))));
    assert_eq!(h.transport.closes(), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[test]
fn reconnect_after_close_restarts_sequence_ids() {
    let h = harness();
    let _init = h.connect();
    let _first: Pending<Value> = h.client.call("GetTime", &json!({}));
    h.client.close();

    let _init = h.connect();
    let _second: Pending<Value> = h.client.call("GetTime", &json!({}));

    assert_eq!(h.client.phase(), SessionPhase::SignedOut);
    assert_eq!(h.last_call().seq, 0);
}

#[test]
fn events_from_a_replaced_connection_are_dropped() {
    let h = harness();
    let _init = h.connect();
    let old_sink = h.transport.sink();
    let _init = h.connect();
    let mut pending: Pending<Value> = h.client.call("GetTime", &json!({}));

    old_sink.message(r#"R:0:{"stale":true}"#);
    old_sink.closed(None);
    h.client.tick();

    assert!(pending.try_take().is_none());
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);

    h.deliver(r#"R:0:{"stale":false}"#);
    assert_eq!(pending.try_take().expect("resolved").expect("ok")["stale"], json!(false));
}
