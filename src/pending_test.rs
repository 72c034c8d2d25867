use super::*;

#[test]
fn try_take_is_empty_until_resolved() {
    let (tx, mut pending) = Pending::<u32>::channel();
    assert!(pending.try_take().is_none());
    tx.send(Ok(5)).expect("send");
    assert_eq!(pending.try_take().expect("ready").expect("ok"), 5);
}

#[test]
fn dropped_resolver_reports_connection_closed() {
    let (tx, mut pending) = Pending::<u32>::channel();
    drop(tx);
    let err = pending.try_take().expect("ready").expect_err("closed");
    assert!(matches!(err, ClientError::ConnectionClosed(_)));
}

#[tokio::test]
async fn ready_handle_resolves_immediately() {
    let value = Pending::ready(Ok("hi")).await.expect("ok");
    assert_eq!(value, "hi");
}

#[tokio::test]
async fn awaiting_after_resolver_dropped_fails() {
    let (tx, pending) = Pending::<()>::channel();
    drop(tx);
    assert!(matches!(pending.await, Err(ClientError::ConnectionClosed(_))));
}
