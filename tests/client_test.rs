//! Facade tests against the in-memory simulated service.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use zkbridge::{
    AclTemplate, Client, Error, NodeType, SessionState, SimServer, MAX_PAYLOAD,
};

const WAIT: Duration = Duration::from_secs(2);

fn connected_client() -> (Arc<SimServer>, Client) {
    let sim = Arc::new(SimServer::new());
    let client = Client::with_defaults(sim.clone());
    client.connect("localhost:2181", |_| {}).unwrap();
    (sim, client)
}

#[test]
fn connect_reports_connected_state() {
    let sim = Arc::new(SimServer::new());
    let client = Client::with_defaults(sim);
    let (tx, rx) = mpsc::channel();
    client
        .connect("localhost:2181", move |state| {
            tx.send(state).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), SessionState::Connected);
}

#[test]
fn save_load_round_trip() {
    let (_sim, client) = connected_client();
    client
        .create("/node", b"", NodeType::Persistent, AclTemplate::Open)
        .unwrap();

    for payload in [
        b"".to_vec(),
        b"hello".to_vec(),
        vec![0u8; 1],
        vec![0xab; MAX_PAYLOAD],
    ] {
        client.save("/node", &payload, None).unwrap();
        let (data, stat) = client.load("/node").unwrap();
        assert_eq!(data, payload);
        assert_eq!(stat.data_length as usize, payload.len());
    }
}

#[test]
fn stale_version_save_fails_and_preserves_value() {
    let (_sim, client) = connected_client();
    client
        .create("/versioned", b"initial", NodeType::Persistent, AclTemplate::Open)
        .unwrap();
    let stat = client.save("/versioned", b"current", None).unwrap();
    assert_eq!(stat.version, 1);

    let err = client
        .save("/versioned", b"stale write", Some(0))
        .unwrap_err();
    assert_eq!(err, Error::BadVersion);

    let (data, stat) = client.load("/versioned").unwrap();
    assert_eq!(data, b"current");
    assert_eq!(stat.version, 1);

    // The matching version succeeds.
    client.save("/versioned", b"next", Some(1)).unwrap();
}

#[test]
fn exists_absence_is_a_negative_result_not_an_error() {
    let (_sim, client) = connected_client();
    assert_eq!(client.exists("/ghost").unwrap(), None);

    client
        .create("/real", b"x", NodeType::Persistent, AclTemplate::Open)
        .unwrap();
    let stat = client.exists("/real").unwrap().expect("node should exist");
    assert_eq!(stat.data_length, 1);
    assert_eq!(stat.version, 0);
}

#[test]
fn children_listing() {
    let (_sim, client) = connected_client();
    client
        .create("/dir", b"", NodeType::Persistent, AclTemplate::Open)
        .unwrap();
    for name in ["a", "b", "c"] {
        client
            .create(
                &format!("/dir/{name}"),
                b"",
                NodeType::Persistent,
                AclTemplate::Open,
            )
            .unwrap();
    }

    let mut kids = client.children("/dir").unwrap();
    kids.sort();
    assert_eq!(kids, ["a", "b", "c"]);

    assert_eq!(client.children("/nowhere").unwrap_err(), Error::NoNode);
}

#[test]
fn sequential_create_returns_increasing_suffixes() {
    let (_sim, client) = connected_client();
    client
        .create("/queue", b"", NodeType::Persistent, AclTemplate::Open)
        .unwrap();

    let mut last = None;
    for _ in 0..5 {
        let created = client
            .create("/queue/item", b"", NodeType::Sequential, AclTemplate::Open)
            .unwrap();
        assert!(created.starts_with("/queue/item"));
        let suffix: u64 = created["/queue/item".len()..].parse().unwrap();
        if let Some(prev) = last {
            assert!(suffix > prev, "suffix {suffix} not above {prev}");
        }
        last = Some(suffix);
    }
}

#[test]
fn create_failure_conditions() {
    let (_sim, client) = connected_client();
    client
        .create("/taken", b"", NodeType::Persistent, AclTemplate::Open)
        .unwrap();

    assert_eq!(
        client
            .create("/taken", b"", NodeType::Persistent, AclTemplate::Open)
            .unwrap_err(),
        Error::NodeExists
    );
    assert_eq!(
        client
            .create("/no/parent/here", b"", NodeType::Persistent, AclTemplate::Open)
            .unwrap_err(),
        Error::NoNode
    );

    client
        .create("/session-bound", b"", NodeType::Ephemeral, AclTemplate::Open)
        .unwrap();
    assert_eq!(
        client
            .create(
                "/session-bound/kid",
                b"",
                NodeType::Persistent,
                AclTemplate::Open
            )
            .unwrap_err(),
        Error::NoChildrenForEphemerals
    );
}

#[test]
fn delete_failure_conditions() {
    let (_sim, client) = connected_client();
    client
        .create("/outer", b"", NodeType::Persistent, AclTemplate::Open)
        .unwrap();
    client
        .create("/outer/inner", b"", NodeType::Persistent, AclTemplate::Open)
        .unwrap();

    assert_eq!(client.delete("/outer", None).unwrap_err(), Error::NotEmpty);
    assert_eq!(
        client.delete("/outer/inner", Some(7)).unwrap_err(),
        Error::BadVersion
    );
    assert_eq!(client.delete("/absent", None).unwrap_err(), Error::NoNode);

    client.delete("/outer/inner", Some(0)).unwrap();
    client.delete("/outer", None).unwrap();
    assert_eq!(client.exists("/outer").unwrap(), None);
}

#[test]
fn oversized_payload_surfaces_overflow_not_truncation() {
    let (sim, client) = connected_client();
    sim.seed("/big", &vec![0x5a; MAX_PAYLOAD + 1]);

    assert_eq!(client.load("/big").unwrap_err(), Error::PayloadOverflow);

    // Same condition through the async path, via the completion.
    let (tx, rx) = mpsc::channel();
    client
        .load_async("/big", move |result| {
            tx.send(result).unwrap();
        })
        .unwrap();
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap().unwrap_err(),
        Error::PayloadOverflow
    );
}

#[test]
fn async_load_and_save_deliver_through_completions() {
    let (_sim, client) = connected_client();
    client
        .create("/async", b"before", NodeType::Persistent, AclTemplate::Open)
        .unwrap();

    let (tx, rx) = mpsc::channel();
    client
        .save_async("/async", b"after", None, move |result| {
            tx.send(result).unwrap();
        })
        .unwrap();
    let stat = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(stat.version, 1);

    let (tx, rx) = mpsc::channel();
    client
        .load_async("/async", move |result| {
            tx.send(result).unwrap();
        })
        .unwrap();
    let (data, stat) = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(data, b"after");
    assert_eq!(stat.version, 1);
}

#[test]
fn async_failures_arrive_only_through_the_completion() {
    let (_sim, client) = connected_client();

    let (tx, rx) = mpsc::channel();
    // Enqueue succeeds; the miss is reported later.
    client
        .load_async("/not-there", move |result| {
            tx.send(result).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap_err(), Error::NoNode);

    let (tx, rx) = mpsc::channel();
    client
        .save_async("/not-there", b"x", None, move |result| {
            tx.send(result).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap_err(), Error::NoNode);
}

#[test]
fn acl_round_trip_with_version_guard() {
    let (_sim, client) = connected_client();
    client
        .create("/secured", b"", NodeType::Persistent, AclTemplate::ReadOnly)
        .unwrap();

    let (acl, stat) = client.get_acl("/secured").unwrap();
    assert_eq!(acl, AclTemplate::ReadOnly.entries());
    assert_eq!(stat.aversion, 0);

    assert_eq!(
        client
            .set_acl("/secured", Some(9), &AclTemplate::Open.entries())
            .unwrap_err(),
        Error::BadVersion
    );
    client
        .set_acl("/secured", Some(0), &AclTemplate::Open.entries())
        .unwrap();
    let (acl, _) = client.get_acl("/secured").unwrap();
    assert_eq!(acl, AclTemplate::Open.entries());
}

#[test]
fn ephemeral_nodes_vanish_when_the_session_expires() {
    let sim = Arc::new(SimServer::new());
    let client = Client::with_defaults(sim.clone());
    let (tx, rx) = mpsc::channel();
    client
        .connect("localhost:2181", move |state| {
            tx.send(state).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), SessionState::Connected);

    let observer = Client::with_defaults(sim.clone());
    observer.connect("localhost:2181", |_| {}).unwrap();

    client
        .create("/lease", b"", NodeType::Ephemeral, AclTemplate::Open)
        .unwrap();
    assert!(observer.exists("/lease").unwrap().is_some());

    let zh = sim.sessions()[0];
    sim.expire_session(zh);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), SessionState::Expired);

    assert_eq!(observer.exists("/lease").unwrap(), None);
}

#[test]
fn election_picks_the_lowest_candidate() {
    let sim = Arc::new(SimServer::new());
    let first = Client::with_defaults(sim.clone());
    first.connect("localhost:2181", |_| {}).unwrap();
    first
        .create("/election", b"", NodeType::Persistent, AclTemplate::Open)
        .unwrap();

    let second = Client::with_defaults(sim.clone());
    second.connect("localhost:2181", |_| {}).unwrap();

    let won = first.elect("/election").unwrap();
    assert!(won.is_leader());
    assert_eq!(won.candidates, vec![won.me]);

    let lost = second.elect("/election").unwrap();
    assert!(!lost.is_leader());
    assert_eq!(lost.leader, won.me);
    assert_eq!(lost.candidates, vec![won.me, lost.me]);

    // The leader's candidacy is ephemeral: once its session goes, the
    // runner-up wins the next round.
    first.disconnect();
    let rerun = second.elect("/election").unwrap();
    assert_eq!(rerun.leader, lost.me);
}
