use std::thread;
use std::time::Duration;

use distcalc::cluster::protocol::{channels, protocol_registry};
use distcalc::transport::channel::star;
use distcalc::transport::flat::{flatten, split_rows};
use distcalc::transport::message::{Envelope, Mailbox, Payload};
use distcalc::transport::registry::TagRegistry;
use distcalc::transport::tcp::{TcpRendezvous, TcpTransport};
use distcalc::transport::{COORDINATOR, Transport};
use distcalc::utils::errors::CalcError;
use distcalc::utils::types::Table;

fn grid(rows: usize, cols: usize) -> Table<f32> {
    (0..rows)
        .map(|r| (0..cols).map(|c| (r * 100 + c) as f32).collect())
        .collect()
}

#[test]
fn test_flatten_split_round_trip() {
    for rows in [0, 1, 7] {
        for cols in [0, 1, 5] {
            let table = grid(rows, cols);
            let flat = flatten(&table);
            assert_eq!(flat.len(), rows * cols);
            let back = split_rows(&flat, rows, cols).unwrap();
            assert_eq!(back, table, "{rows} x {cols}");
        }
    }
}

#[test]
fn test_flatten_is_row_major() {
    let table = vec![vec![1, 2, 3], vec![4, 5, 6]];
    assert_eq!(flatten(&table), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_split_rejects_wrong_length() {
    let err = split_rows(&[1.0f32, 2.0, 3.0], 2, 2).unwrap_err();
    assert!(matches!(err, CalcError::TransportFailure(_)));
}

#[test]
fn test_registry_assigns_in_first_use_order() {
    let mut registry = TagRegistry::new();
    assert!(registry.is_empty());
    assert_eq!(registry.register("a"), 0);
    assert_eq!(registry.register("b"), 1);
    assert_eq!(registry.register("a"), 0);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.tag("b").unwrap(), 1);

    let err = registry.tag("missing").unwrap_err();
    assert!(matches!(err, CalcError::UnregisteredChannel(ref name) if name == "missing"));
}

#[test]
fn test_protocol_registry_has_every_channel() {
    let registry = protocol_registry();
    assert_eq!(registry.len(), channels::ALL.len());
    for (i, name) in channels::ALL.iter().enumerate() {
        assert_eq!(registry.tag(name).unwrap(), i as u32);
    }
}

#[test]
fn test_mailbox_keeps_fifo_per_source_and_tag() {
    let mut mailbox: Mailbox<f32> = Mailbox::default();
    mailbox.stash(Envelope { source: 1, tag: 3, payload: Payload::Scalar(10) });
    mailbox.stash(Envelope { source: 2, tag: 3, payload: Payload::Scalar(20) });
    mailbox.stash(Envelope { source: 1, tag: 3, payload: Payload::Scalar(11) });
    assert_eq!(mailbox.len(), 3);

    assert_eq!(mailbox.take(1, 3), Some(Payload::Scalar(10)));
    assert_eq!(mailbox.take(1, 3), Some(Payload::Scalar(11)));
    assert_eq!(mailbox.take(1, 3), None);
    assert_eq!(mailbox.take(2, 4), None);
    assert_eq!(mailbox.take(2, 3), Some(Payload::Scalar(20)));
    assert!(mailbox.is_empty());
}

#[test]
fn test_channel_star_ranks_and_size() {
    let endpoints = star::<f32>(4);
    assert_eq!(endpoints.len(), 4);
    for (i, end) in endpoints.iter().enumerate() {
        assert_eq!(end.rank(), i);
        assert_eq!(end.size(), 4);
    }
    assert!(endpoints[0].is_coordinator());
    assert!(!endpoints[1].is_coordinator());
}

#[test]
fn test_channel_receive_matches_tag_not_arrival_order() {
    let mut endpoints = star::<f32>(2);
    let mut worker = endpoints.pop().unwrap();
    let mut coordinator = endpoints.pop().unwrap();

    coordinator.send_buffer(&[1.0, 2.0], 1, 7).unwrap();
    coordinator.send_scalar(42, 1, 5).unwrap();

    assert_eq!(worker.recv_scalar(COORDINATOR, 5).unwrap(), 42);
    assert_eq!(worker.recv_buffer(2, COORDINATOR, 7).unwrap(), vec![1.0, 2.0]);

    worker.send_scalar(9, COORDINATOR, 1).unwrap();
    assert_eq!(coordinator.recv_scalar(1, 1).unwrap(), 9);
}

#[test]
fn test_channel_receive_from_specific_source() {
    let mut endpoints = star::<i32>(3);
    let mut second = endpoints.pop().unwrap();
    let mut first = endpoints.pop().unwrap();
    let mut coordinator = endpoints.pop().unwrap();

    second.send_buffer(&[2], COORDINATOR, 0).unwrap();
    first.send_buffer(&[1], COORDINATOR, 0).unwrap();

    assert_eq!(coordinator.recv_buffer(1, 1, 0).unwrap(), vec![1]);
    assert_eq!(coordinator.recv_buffer(1, 2, 0).unwrap(), vec![2]);
}

#[test]
fn test_channel_rejects_wrong_count_and_kind() {
    let mut endpoints = star::<f32>(2);
    let mut worker = endpoints.pop().unwrap();
    let mut coordinator = endpoints.pop().unwrap();

    coordinator.send_buffer(&[1.0, 2.0, 3.0], 1, 0).unwrap();
    let err = worker.recv_buffer(2, COORDINATOR, 0).unwrap_err();
    assert!(matches!(err, CalcError::TransportFailure(_)));

    coordinator.send_scalar(3, 1, 1).unwrap();
    let err = worker.recv_buffer(3, COORDINATOR, 1).unwrap_err();
    assert!(matches!(err, CalcError::TransportFailure(_)));
}

#[test]
fn test_channel_workers_only_reach_coordinator() {
    let mut endpoints = star::<f32>(3);
    let mut worker = endpoints.remove(1);
    let err = worker.send_scalar(1, 2, 0).unwrap_err();
    assert!(matches!(err, CalcError::TransportFailure(_)));
    let err = worker.send_scalar(1, 9, 0).unwrap_err();
    assert!(matches!(err, CalcError::TransportFailure(_)));
}

#[test]
fn test_channel_receive_fails_when_peers_are_gone() {
    let mut endpoints = star::<f32>(2);
    let mut worker = endpoints.pop().unwrap();
    drop(endpoints);
    let err = worker.recv_scalar(COORDINATOR, 0).unwrap_err();
    assert!(matches!(err, CalcError::TransportFailure(_)));
}

#[test]
fn test_channel_receive_timeout() {
    let mut endpoints = star::<f32>(2);
    let mut coordinator = endpoints
        .remove(0)
        .with_recv_timeout(Some(Duration::from_millis(20)));
    let err = coordinator.recv_scalar(1, 0).unwrap_err();
    assert!(matches!(err, CalcError::TransportFailure(ref msg) if msg.contains("timed out")));
    drop(endpoints);
}

#[test]
fn test_tcp_exchange_out_of_order() {
    let rendezvous = TcpRendezvous::bind("127.0.0.1:0").unwrap();
    let addr = rendezvous.local_addr().unwrap();

    let worker = thread::spawn(move || {
        let mut transport = TcpTransport::<f64>::connect(addr, 1, None).unwrap();
        assert_eq!(transport.rank(), 1);
        assert_eq!(transport.size(), 2);
        let data = transport.recv_buffer(3, COORDINATOR, 4).unwrap();
        let value = transport.recv_scalar(COORDINATOR, 2).unwrap();
        transport.send_buffer(&[value as f64, data.iter().sum()], COORDINATOR, 6).unwrap();
    });

    let mut coordinator = rendezvous.accept::<f64>(2).unwrap();
    assert_eq!(coordinator.size(), 2);
    coordinator.send_scalar(17, 1, 2).unwrap();
    coordinator.send_buffer(&[0.5, 1.5, 2.0], 1, 4).unwrap();
    assert_eq!(coordinator.recv_buffer(2, 1, 6).unwrap(), vec![17.0, 4.0]);
    worker.join().unwrap();
}

#[test]
fn test_tcp_rejects_out_of_range_rank() {
    let rendezvous = TcpRendezvous::bind("127.0.0.1:0").unwrap();
    let addr = rendezvous.local_addr().unwrap();

    let worker = thread::spawn(move || TcpTransport::<f32>::connect(addr, 5, None).is_err());

    let err = rendezvous.accept::<f32>(2).err().unwrap();
    assert!(matches!(err, CalcError::TransportFailure(_)));
    assert!(worker.join().unwrap());
}

#[test]
fn test_tcp_coordinator_cannot_connect() {
    let err = TcpTransport::<f32>::connect("127.0.0.1:1", COORDINATOR, None).err().unwrap();
    assert!(matches!(err, CalcError::TransportFailure(_)));
}

#[test]
fn test_tcp_accept_times_out_on_silent_peer() {
    let rendezvous = TcpRendezvous::bind("127.0.0.1:0")
        .unwrap()
        .with_recv_timeout(Some(Duration::from_millis(50)));
    let addr = rendezvous.local_addr().unwrap();
    let silent = std::net::TcpStream::connect(addr).unwrap();

    let err = rendezvous.accept::<f32>(2).err().unwrap();
    assert!(matches!(err, CalcError::TransportFailure(ref msg) if msg.contains("handshake")));
    drop(silent);
}
