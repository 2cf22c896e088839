//! A client and a simulated controller talking over in-process links.
//!
//! ```text
//!  GapClient ──commands──> host registry ──> SimController
//!      ^                                          │
//!      └──── client registry <──bt_ready_cb───────┘
//! ```

use std::{
    sync::{Arc, mpsc},
    time::Duration,
};

use stubwire_core::{
    Caller, Registry, RegistryBuilder, Request, RpcConfig, RpcError, SizeEstimate,
};
use stubwire_gap::{
    BtAddrLe, BtData, EALREADY, EINVAL, GapClient, GapService, ID_MAX, IRK_ANY, MAX_NAME_LEN,
    NameOut, SimController, client::BtSetName, cmd, register_host,
};
use stubwire_harness::{Fault, FaultPlan, LoopbackTransport, RecordingReporter, ThreadedPeer};
use stubwire_proto::DecodeFault;

struct Link {
    client: GapClient,
    controller: Arc<SimController>,
    reporter: Arc<RecordingReporter>,
}

fn host(
    controller: &Arc<SimController>,
    reporter: &Arc<RecordingReporter>,
    events: Caller,
) -> Registry {
    let mut builder =
        RegistryBuilder::new(RpcConfig::default()).with_reporter(Arc::clone(reporter) as _);
    register_host(&mut builder, controller, events).unwrap();
    builder.build()
}

fn loopback_link(controller: SimController, plan: FaultPlan, seed: u64) -> Link {
    let to_host = LoopbackTransport::with_faults(plan, seed);
    let to_client = LoopbackTransport::new();
    let client = GapClient::new(Caller::new(Arc::new(to_host.clone()), RpcConfig::default()));

    let controller = Arc::new(controller);
    let reporter = Arc::new(RecordingReporter::new());
    let events = Caller::new(Arc::new(to_client.clone()), RpcConfig::default());
    to_host.bind(host(&controller, &reporter, events)).unwrap();
    to_client.bind(client.event_registry(RpcConfig::default()).unwrap()).unwrap();

    Link { client, controller, reporter }
}

fn link() -> Link {
    loopback_link(SimController::with_name("stubwire"), FaultPlan::none(), 0)
}

#[test]
fn test1_round_trip() {
    let link = link();
    assert!(link.client.test1(1).unwrap());
    assert!(!link.client.test1(0).unwrap());
    assert!(!link.client.test1(i32::MIN).unwrap());
    assert_eq!(link.client.caller().pool().in_use(), 0);
}

#[test]
fn enable_fires_the_ready_callback() {
    let link = link();
    let (tx, rx) = mpsc::channel();
    let sender = tx.clone();
    let err = link.client.bt_enable(Some(Box::new(move |err| sender.send(err).unwrap()))).unwrap();

    assert_eq!(err, 0);
    assert_eq!(rx.try_recv(), Ok(0));
    assert_eq!(link.client.pending_callbacks(), 0);
    assert!(link.controller.is_enabled());

    // rejected: the callback is dropped without firing
    let err = link.client.bt_enable(Some(Box::new(move |err| tx.send(err).unwrap()))).unwrap();
    assert_eq!(err, -EALREADY);
    assert!(rx.try_recv().is_err());
    assert_eq!(link.client.pending_callbacks(), 0);
}

#[test]
fn enable_without_callback() {
    let link = link();
    assert_eq!(link.client.bt_enable(None).unwrap(), 0);
    assert!(link.reporter.reports().is_empty());
}

#[test]
fn empty_name_needs_no_scratchpad() {
    assert_eq!(BtSetName("").request_size().unwrap(), SizeEstimate::encoded(1));

    let link = link();
    assert_eq!(link.client.bt_set_name("").unwrap(), 0);
    assert_eq!(link.client.bt_get_name().unwrap().as_deref(), Some(""));
}

#[test]
fn longest_name_reserves_its_aligned_length() {
    let name = "n".repeat(MAX_NAME_LEN);
    let estimate = BtSetName(&name).request_size().unwrap();
    assert_eq!(estimate.scratchpad, stubwire_core::align_up(MAX_NAME_LEN).unwrap());

    let link = link();
    assert_eq!(link.client.bt_set_name(&name).unwrap(), 0);
    assert_eq!(link.client.bt_get_name().unwrap(), Some(name));
}

#[test]
fn overlong_name_is_rejected_before_sending() {
    let link = link();
    let name = "n".repeat(MAX_NAME_LEN + 1);
    let err = link.client.bt_set_name(&name).unwrap_err();
    assert!(matches!(err, RpcError::LimitExceeded { field: "name", len: 128, max: MAX_NAME_LEN }));
    assert_eq!(link.client.bt_get_name().unwrap().as_deref(), Some("stubwire"));
}

#[test]
fn name_is_copied_into_caller_storage() {
    let link = link();
    let mut buf = [0u8; 3];
    let out = link.client.bt_get_name_out(&mut buf).unwrap();
    assert_eq!(out, NameOut { found: true, len: 3 });
    assert_eq!(&buf, b"stu");

    let mut empty: [u8; 0] = [];
    assert_eq!(link.client.bt_get_name_out(&mut empty).unwrap(), NameOut { found: true, len: 0 });
}

#[test]
fn missing_name_is_none() {
    let link = loopback_link(SimController::new(), FaultPlan::none(), 0);
    assert_eq!(link.client.bt_get_name().unwrap(), None);
}

#[test]
fn id_get_with_zero_count() {
    let link = link();
    link.client.bt_enable(None).unwrap();
    assert_eq!(link.client.bt_id_get(&mut []).unwrap(), 0);

    let mut addrs = [BtAddrLe::ANY; ID_MAX];
    assert_eq!(link.client.bt_id_get(&mut addrs).unwrap(), 1);
    assert!(!addrs[0].is_any());
    assert!(addrs[1..].iter().all(BtAddrLe::is_any));
}

#[test]
fn identity_address_round_trip() {
    let link = link();
    let addr = BtAddrLe::random_static([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
    assert_eq!(link.client.bt_set_id_addr(addr).unwrap(), 0);
    assert_eq!(link.client.bt_set_id_addr(BtAddrLe::ANY).unwrap(), -EINVAL);

    let mut out = [BtAddrLe::ANY; 1];
    assert_eq!(link.client.bt_id_get(&mut out).unwrap(), 1);
    assert_eq!(out[0], addr);
}

#[test]
fn id_create_writes_back_generated_values() {
    let link = link();

    let mut addr = BtAddrLe::ANY;
    let mut irk = IRK_ANY;
    let id = link.client.bt_id_create(Some(&mut addr), Some(&mut irk)).unwrap();
    assert_eq!(id, 0);
    assert!(!addr.is_any());
    assert_ne!(irk, IRK_ANY);
    assert_eq!(link.controller.irk(0), Some(irk));

    // caller-provided values stay as they were
    let mut given = BtAddrLe::random_static([7; 6]);
    let mut key = [0x42; 16];
    let id = link.client.bt_id_create(Some(&mut given), Some(&mut key)).unwrap();
    assert_eq!(id, 1);
    assert_eq!(given, BtAddrLe::random_static([7; 6]));
    assert_eq!(key, [0x42; 16]);
    assert_eq!(link.controller.irk(1), Some([0x42; 16]));

    // nothing passed in, nothing written back
    assert_eq!(link.client.bt_id_create(None, None).unwrap(), 2);

    // duplicate address: the error comes back, the argument is untouched
    assert_eq!(link.client.bt_id_create(Some(&mut given), None).unwrap(), -EALREADY);
    assert!(link.reporter.reports().is_empty());
}

#[test]
fn advertising_data_reaches_the_controller() {
    let link = link();
    let flags = [0x06];
    let name = b"stubwire";
    let ad = [BtData::new(0x01, &flags), BtData::new(0x09, name)];
    let sd = [BtData::new(0xff, &[0x59, 0x00])];

    assert_eq!(link.client.bt_le_adv_update_data(&ad, &sd).unwrap(), 0);
    assert_eq!(link.controller.advertising_data(), vec![(0x01, vec![0x06]), (0x09, name.to_vec())]);
    assert_eq!(link.controller.scan_response_data(), vec![(0xff, vec![0x59, 0x00])]);

    assert_eq!(link.client.bt_le_adv_update_data(&[], &[]).unwrap(), 0);
    assert!(link.controller.advertising_data().is_empty());

    let long = [0u8; 40];
    let too_long = [BtData::new(0xff, &long)];
    assert_eq!(link.client.bt_le_adv_update_data(&too_long, &[]).unwrap(), -EINVAL);
}

#[test]
fn truncated_requests_never_reach_the_controller() {
    let plan = FaultPlan::only(Fault::Truncate, 1.0);
    let link = loopback_link(SimController::with_name("kept"), plan, 3);
    for _ in 0..10 {
        assert!(link.client.bt_set_name("replacement").is_err());
    }
    assert_eq!(link.controller.bt_get_name().as_deref(), Some("kept"));

    let reports = link.reporter.reports();
    assert_eq!(reports.len(), 10);
    assert!(reports.iter().all(|(op, _)| *op == cmd::BT_SET_NAME));
    assert!(reports.iter().all(|(_, fault)| !matches!(fault, DecodeFault::TrailingData { .. })));
    assert_eq!(link.client.caller().pool().in_use(), 0);
}

#[test]
fn threaded_host_delivers_ready_events() {
    let to_client = LoopbackTransport::new();
    let controller = Arc::new(SimController::new());
    let reporter = Arc::new(RecordingReporter::new());
    let events = Caller::new(Arc::new(to_client.clone()), RpcConfig::default());
    let host = host(&controller, &reporter, events);
    let peer = ThreadedPeer::spawn(host, Duration::from_secs(5)).unwrap();

    let client = GapClient::new(Caller::new(Arc::new(peer.transport()), RpcConfig::default()));
    to_client.bind(client.event_registry(RpcConfig::default()).unwrap()).unwrap();

    let (tx, rx) = mpsc::channel();
    assert_eq!(client.bt_enable(Some(Box::new(move |err| tx.send(err).unwrap()))).unwrap(), 0);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(0));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let client = client.clone();
            std::thread::spawn(move || client.test1(i).unwrap())
        })
        .collect();
    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![false, true, true, true]);
}
