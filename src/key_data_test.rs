use serde_json::{Value, json};

use super::*;
use crate::client::test_helpers::{Harness, harness};
use crate::messages::SignInReply;
use crate::value::DataType;

fn item(key: &str, value: Value, modified: f64, deleted: bool) -> DataItemReply {
    DataItemReply {
        id: "rec-1".into(),
        key: key.into(),
        value,
        data_type: DataType::Number,
        modified,
        deleted,
        ..DataItemReply::default()
    }
}

fn reply(items: Vec<DataItemReply>) -> UserDataReply {
    UserDataReply { values: items.into_iter().map(|i| (i.key.clone(), i)).collect() }
}

fn record(h: &Harness, owner: &str) -> KeyData {
    let info = KeyDataInfo { id: "rec-1".into(), record_type: "house".into(), owner: owner.into(), ..KeyDataInfo::default() };
    KeyData::new(h.client.clone(), info)
}

fn sign_in_as(h: &Harness, user_id: &str) {
    h.client.adopt_session(&SignInReply { user_id: user_id.into(), session_id: "s".into(), ..SignInReply::default() });
}

#[test]
fn load_replaces_keys_and_tracks_newest_modification() {
    let h = harness();
    let mut data = record(&h, "u1");

    data.apply_load(reply(vec![item("a", json!(1), 10.0, false), item("b", json!(2), 30.0, false)]));

    assert_eq!(data.most_recent(), 30.0);
    assert!(matches!(data.get("a"), Some(Ok(DataValue::Number(n))) if n == 1.0));
    assert!(data.get("missing").is_none());

    data.apply_load(reply(vec![item("c", json!(3), 5.0, false)]));
    assert!(data.get("a").is_none());
    assert_eq!(data.keys().collect::<Vec<_>>(), vec!["c"]);
    assert_eq!(data.most_recent(), 30.0);
}

#[test]
fn refresh_merges_and_applies_deletions() {
    let h = harness();
    let mut data = record(&h, "u1");
    data.apply_load(reply(vec![item("a", json!(1), 10.0, false), item("b", json!(2), 20.0, false)]));

    data.apply_refresh(reply(vec![item("a", json!(5), 40.0, false), item("b", Value::Null, 41.0, true)]));

    assert!(matches!(data.get("a"), Some(Ok(DataValue::Number(n))) if n == 5.0));
    assert!(data.get("b").is_none());
    assert_eq!(data.most_recent(), 41.0);
}

#[test]
fn set_requires_ownership() {
    let h = harness();
    let mut data = record(&h, "u1");

    assert!(matches!(data.set("a", 1.0), Err(KeyDataError::ReadOnly(id)) if id == "rec-1"));

    sign_in_as(&h, "someone-else");
    assert!(matches!(data.set("a", 1.0), Err(KeyDataError::ReadOnly(_))));

    sign_in_as(&h, "u1");
    data.set("a", 1.0).expect("owner may write");
    assert!(data.is_dirty());
}

#[test]
fn set_to_current_value_is_not_dirty() {
    let h = harness();
    sign_in_as(&h, "u1");
    let mut data = record(&h, "u1");
    data.apply_load(reply(vec![item("a", json!(1.0), 10.0, false)]));

    data.set("a", 1.0).expect("set");
    assert!(!data.is_dirty());

    data.set("a", 2.0).expect("set");
    assert!(data.is_dirty());
}

#[tokio::test]
async fn save_sends_dirty_keys_and_clears_them() {
    let h = harness();
    let _init = h.connect();
    sign_in_as(&h, "u1");
    let mut data = record(&h, "u1");
    data.set("name", "villa").expect("set");
    data.set("rooms", 4.0).expect("set");

    let saving = tokio::spawn(async move {
        data.save().await.map(|()| data)
    });
    // Let the save task issue its call.
    while h.client.outstanding_calls() == 0 {
        tokio::task::yield_now().await;
    }

    let call = h.last_call();
    assert_eq!(call.api, "SetDataKeys");
    let body: Value = serde_json::from_str(&call.body).expect("json");
    assert_eq!(body["id"], "rec-1");
    assert_eq!(
        body["values"],
        json!([
            {"key": "name", "value": "villa", "data_type": "string"},
            {"key": "rooms", "value": 4.0, "data_type": "number"},
        ])
    );

    h.deliver(&format!(r#"R:{}:{{"updated_at":99}}"#, call.seq));
    let data = saving.await.expect("join").expect("save ok");
    assert!(!data.is_dirty());
}

#[tokio::test]
async fn save_without_changes_makes_no_call() {
    let h = harness();
    let _init = h.connect();
    sign_in_as(&h, "u1");
    let mut data = record(&h, "u1");

    data.save().await.expect("nothing to save");
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn find_own_record_requires_sign_in() {
    let h = harness();
    let _init = h.connect();
    assert!(matches!(KeyData::find(&h.client, None).await, Err(KeyDataError::NotSignedIn)));
}
