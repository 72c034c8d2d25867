use super::*;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

type Log = Arc<Mutex<Vec<(u64, Result<String, String>)>>>;

fn recording(log: &Log, tag: u64) -> Completion {
    let log = Arc::clone(log);
    Box::new(move |outcome| {
        let outcome = outcome.map_err(|e| e.to_string());
        log.lock().expect("log lock").push((tag, outcome));
    })
}

#[test]
fn sequence_ids_start_at_zero_and_increase() {
    let table = CorrelationTable::new();
    let log = Log::default();
    let ids: Vec<u64> = (0..3)
        .map(|i| table.register("GetTime", recording(&log, i)).expect("register"))
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(table.len(), 3);
    assert_eq!(table.next_seq(), 3);
}

#[test]
fn resolve_completes_exactly_the_matching_entry() {
    let table = CorrelationTable::new();
    let log = Log::default();
    let a = table.register("A", recording(&log, 100)).expect("register");
    let b = table.register("B", recording(&log, 200)).expect("register");

    table.resolve(b, Ok("{\"b\":1}".into())).expect("resolve b");
    table.resolve(a, Err(ClientError::network("down"))).expect("resolve a");

    let log = log.lock().expect("log lock");
    assert_eq!(log[0], (200, Ok("{\"b\":1}".to_owned())));
    assert_eq!(log[1].0, 100);
    assert!(log[1].1.is_err());
    assert_eq!(table.len(), 0);
}

#[test]
fn second_resolution_is_an_unknown_sequence() {
    let table = CorrelationTable::new();
    let log = Log::default();
    let seq = table.register("A", recording(&log, 1)).expect("register");

    table.resolve(seq, Ok("{}".into())).expect("first resolve");
    let err = table.resolve(seq, Ok("{}".into())).expect_err("second resolve");
    assert!(matches!(err, ProtocolError::UnknownSequence(s) if s == seq));
    assert_eq!(log.lock().expect("log lock").len(), 1);
}

#[test]
fn resolve_of_never_registered_id_is_reported() {
    let table = CorrelationTable::new();
    let err = table.resolve(42, Ok("{}".into())).expect_err("unknown");
    assert!(matches!(err, ProtocolError::UnknownSequence(42)));
}

#[test]
fn fail_all_completes_everything_in_sequence_order() {
    let table = CorrelationTable::new();
    let log = Log::default();
    for tag in 0..5 {
        table.register("A", recording(&log, tag)).expect("register");
    }

    assert_eq!(table.fail_all(|| ClientError::connection_closed("closed")), 5);
    let log = log.lock().expect("log lock");
    assert_eq!(log.iter().map(|(tag, _)| *tag).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert!(log.iter().all(|(_, outcome)| outcome.is_err()));
}

#[test]
fn reset_restarts_counter_for_new_connection() {
    let table = CorrelationTable::new();
    let log = Log::default();
    table.register("A", recording(&log, 0)).expect("register");
    table.register("A", recording(&log, 1)).expect("register");

    assert_eq!(table.reset(|| ClientError::connection_closed("switch")), 2);
    assert_eq!(table.len(), 0);
    assert_eq!(table.register("A", recording(&log, 2)).expect("register"), 0);
}

#[test]
fn still_pending_id_is_rejected_and_completion_returned() {
    let table = CorrelationTable::new();
    let log = Log::default();
    table.register("A", recording(&log, 0)).expect("register");
    // Force the counter back onto the id that is still outstanding.
    table.lock().next_seq = 0;

    let rejected = table.register("B", recording(&log, 1)).expect_err("duplicate id");
    assert!(matches!(rejected.error, ProtocolError::DuplicateSequence(0)));
    assert!(format!("{rejected:?}").contains("DuplicateSequence"));

    (rejected.complete)(Err(ClientError::network("rejected")));
    assert_eq!(log.lock().expect("log lock")[0].0, 1);
    assert_eq!(table.len(), 1);
}

#[test]
fn completion_may_register_new_calls() {
    let table = Arc::new(CorrelationTable::new());
    let inner_table = Arc::clone(&table);
    let log = Log::default();
    let inner_log = Arc::clone(&log);
    let seq = table
        .register(
            "Outer",
            Box::new(move |_| {
                inner_table.register("Inner", recording(&inner_log, 9)).expect("nested register");
            }),
        )
        .expect("register");

    table.resolve(seq, Ok("{}".into())).expect("resolve");
    assert_eq!(table.len(), 1);
}

#[test]
fn interleaved_replies_each_reach_their_own_caller() {
    let table = Arc::new(CorrelationTable::new());
    let (tx, rx) = mpsc::channel::<(u64, String)>();

    let registrars: Vec<_> = (0..4)
        .map(|_| {
            let table = Arc::clone(&table);
            let tx = tx.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|_| {
                        let tx = tx.clone();
                        let slot = Arc::new(Mutex::new(None::<u64>));
                        let slot_in = Arc::clone(&slot);
                        let seq = table
                            .register(
                                "Echo",
                                Box::new(move |outcome| {
                                    let mine = slot_in.lock().expect("slot").expect("seq recorded");
                                    tx.send((mine, outcome.expect("reply"))).expect("send");
                                }),
                            )
                            .expect("register");
                        *slot.lock().expect("slot") = Some(seq);
                        seq
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    drop(tx);

    let mut seqs: Vec<u64> = registrars.into_iter().flat_map(|h| h.join().expect("registrar")).collect();
    assert_eq!(seqs.len(), 200);

    // Answer in a scrambled order.
    seqs.sort_unstable_by_key(|s| (s * 7919) % 211);
    for seq in &seqs {
        table.resolve(*seq, Ok(seq.to_string())).expect("resolve");
    }

    let mut delivered: Vec<(u64, String)> = rx.iter().collect();
    assert_eq!(delivered.len(), 200);
    for (mine, payload) in &delivered {
        assert_eq!(mine.to_string(), *payload);
    }
    delivered.sort_unstable();
    delivered.dedup();
    assert_eq!(delivered.len(), 200);
}
