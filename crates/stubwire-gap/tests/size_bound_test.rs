//! Size bounds against the bytes actually produced.
//!
//! Every request goes through a tap that records it before the host sees
//! it. For arbitrary argument shapes the encoded message must fit the bound
//! computed before encoding, and the scratchpad header must announce exactly
//! what the host reserves while decoding.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use proptest::prelude::*;
use stubwire_core::{
    Caller, HandlerOutcome, HostOperation, Registry, Request, RpcConfig, Scratchpad, SizeEstimate,
    Transport, TransportError, WireShape, align_up,
};
use stubwire_gap::{
    ADV_DATA_MAX, BtAddrLe, BtData, GapClient, GapService, ID_MAX, MAX_NAME_LEN, SimController,
    client::{BtIdCreate, BtLeAdvUpdateData, BtSetName},
    cmd,
    host::IdGetHandler,
    host_registry,
};
use stubwire_harness::LoopbackTransport;
use stubwire_proto::{DecodeCtx, OperationId};

/// Records requests and command responses, then forwards them.
struct Tap {
    inner: LoopbackTransport,
    sent: Mutex<Vec<(OperationId, Bytes)>>,
    received: Mutex<Vec<Bytes>>,
}

impl Tap {
    fn last(&self) -> (OperationId, Bytes) {
        self.sent.lock().unwrap().last().cloned().unwrap()
    }

    fn last_response(&self) -> Bytes {
        self.received.lock().unwrap().last().cloned().unwrap()
    }
}

impl Transport for Tap {
    fn dispatch_command(&self, op: OperationId, message: Bytes) -> Result<Bytes, TransportError> {
        self.sent.lock().unwrap().push((op, message.clone()));
        let response = self.inner.dispatch_command(op, message)?;
        self.received.lock().unwrap().push(response.clone());
        Ok(response)
    }

    fn dispatch_event(&self, op: OperationId, message: Bytes) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((op, message.clone()));
        self.inner.dispatch_event(op, message)
    }
}

fn tapped(controller: SimController) -> (GapClient, Arc<Tap>, Arc<SimController>) {
    let inner = LoopbackTransport::new();
    let controller = Arc::new(controller);
    let events = Caller::new(Arc::new(LoopbackTransport::new()), RpcConfig::default());
    inner.bind(host_registry(&controller, events, RpcConfig::default()).unwrap()).unwrap();

    let tap = Arc::new(Tap { inner, sent: Mutex::default(), received: Mutex::default() });
    let client = GapClient::new(Caller::new(Arc::clone(&tap) as _, RpcConfig::default()));
    (client, tap, controller)
}

fn announced_scratchpad(message: &[u8]) -> usize {
    let mut ctx = DecodeCtx::new(message);
    let announced = ctx.decode_scratchpad_header();
    assert!(ctx.is_ok());
    announced
}

fn host() -> Registry {
    let events = Caller::new(Arc::new(LoopbackTransport::new()), RpcConfig::default());
    host_registry(&Arc::new(SimController::new()), events, RpcConfig::default()).unwrap()
}

fn name_strategy() -> impl Strategy<Value = String> {
    "\\PC{0,32}".prop_filter("fits the name limit", |name| name.len() <= MAX_NAME_LEN)
}

fn data_strategy() -> impl Strategy<Value = Vec<(u8, Vec<u8>)>> {
    prop::collection::vec((any::<u8>(), prop::collection::vec(any::<u8>(), 0..12)), 0..4)
}

fn as_data(items: &[(u8, Vec<u8>)]) -> Vec<BtData<'_>> {
    items.iter().map(|(kind, data)| BtData::new(*kind, data)).collect()
}

proptest! {
    #[test]
    fn set_name_fits_its_bound(name in name_strategy()) {
        let (client, tap, controller) = tapped(SimController::new());
        prop_assert_eq!(client.bt_set_name(&name).unwrap(), 0);

        let estimate = BtSetName(&name).request_size().unwrap().with_scratchpad_header().unwrap();
        let (op, message) = tap.last();
        prop_assert_eq!(op, cmd::BT_SET_NAME);
        prop_assert!(message.len() <= estimate.max_encoded);
        prop_assert_eq!(announced_scratchpad(&message), align_up(name.len()).unwrap());
        prop_assert_eq!(controller.bt_get_name(), Some(name));
    }

    #[test]
    fn advertising_data_fits_its_bound(ad in data_strategy(), sd in data_strategy()) {
        let (client, tap, controller) = tapped(SimController::new());
        let (ad_items, sd_items) = (as_data(&ad), as_data(&sd));
        client.bt_le_adv_update_data(&ad_items, &sd_items).unwrap();

        let request = BtLeAdvUpdateData { ad: &ad_items, sd: &sd_items };
        let estimate = request.request_size().unwrap().with_scratchpad_header().unwrap();
        let (_, message) = tap.last();
        prop_assert!(message.len() <= estimate.max_encoded);

        let payloads: usize =
            ad.iter().chain(&sd).map(|(_, data)| align_up(data.len()).unwrap()).sum();
        prop_assert_eq!(announced_scratchpad(&message), payloads);

        let fits = |items: &[(u8, Vec<u8>)]| {
            items.iter().map(|(_, d)| 2 + d.len()).sum::<usize>() <= ADV_DATA_MAX
        };
        if fits(&ad) && fits(&sd) {
            prop_assert_eq!(controller.advertising_data(), ad);
            prop_assert_eq!(controller.scan_response_data(), sd);
        }
    }

    #[test]
    fn id_create_fits_its_bound(
        addr in prop::option::of(prop::option::of(any::<[u8; 6]>())),
        irk in prop::option::of(prop::option::of(any::<[u8; 16]>())),
    ) {
        // outer None: nothing passed; inner None: the "any" value
        let mut addr = addr.map(|raw| raw.map_or(BtAddrLe::ANY, BtAddrLe::random_static));
        let mut irk = irk.map(|raw| raw.unwrap_or_default());

        let estimate = BtIdCreate::new(addr.as_mut(), irk.as_mut()).request_size().unwrap();
        let (client, tap, _) = tapped(SimController::new());
        let id = client.bt_id_create(addr.as_mut(), irk.as_mut()).unwrap();
        prop_assert_eq!(id, 0);

        let (_, message) = tap.last();
        prop_assert!(message.len() <= estimate.max_encoded);
        prop_assert!(addr.is_none_or(|addr| !addr.is_any()));
    }

    #[test]
    fn id_get_response_fits_its_bound(created in 0..=ID_MAX, count in 0usize..8) {
        let controller = SimController::new();
        for _ in 0..created {
            controller.bt_id_create(None, None);
        }
        let (client, tap, controller) = tapped(controller);
        let mut out = vec![BtAddrLe::ANY; count];
        let returned = client.bt_id_get(&mut out).unwrap();
        prop_assert_eq!(returned, created.min(count));

        let addrs = controller.bt_id_get(count);
        let estimate = IdGetHandler(Arc::clone(&controller)).response_size(&addrs).unwrap();
        let response = tap.last_response();
        prop_assert!(response.len() <= estimate.max_encoded);
        prop_assert_eq!(&out[..returned], &addrs[..]);
        if returned == 0 {
            prop_assert_eq!(&response[..], &[0x80][..]);
        }
    }

    #[test]
    fn host_never_reserves_more_than_announced(announced in 0usize..64, name in name_strategy()) {
        let mut ctx = stubwire_proto::EncodeCtx::with_capacity(256);
        ctx.encode_scratchpad_header(announced);
        ctx.encode_str(&name);
        let message = ctx.finish().unwrap();

        let registry = host();
        let outcome = registry.deliver(cmd::BT_SET_NAME.route_key(), &message).unwrap();
        let needed = align_up(name.len()).unwrap();
        if needed <= announced {
            prop_assert!(matches!(outcome, HandlerOutcome::Sent(_)));
        } else {
            prop_assert!(matches!(outcome, HandlerOutcome::Reported(_)));
        }
    }
}

#[test]
fn data_shape_matches_what_the_host_reserves() {
    let payload = [1u8, 2, 3];
    let items = [BtData::new(0x01, &payload), BtData::new(0x02, &[])];
    let estimate = items.size_estimate().unwrap();
    assert_eq!(estimate.scratchpad, align_up(3).unwrap());

    let mut pad = Scratchpad::open(estimate.scratchpad, estimate.scratchpad).unwrap();
    let first = pad.alloc_bytes(&payload).unwrap();
    let second = pad.alloc_bytes(&[]).unwrap();
    assert_eq!(pad.bytes(first), payload);
    assert!(pad.bytes(second).is_empty());
    assert_eq!(pad.remaining(), 0);
}

#[test]
fn empty_id_get_response_costs_only_the_array_head() {
    let handler = IdGetHandler(Arc::new(SimController::new()));
    assert_eq!(handler.response_size(&Vec::new()).unwrap(), SizeEstimate::encoded(1));

    let one = handler.response_size(&vec![BtAddrLe::ANY]).unwrap();
    assert_eq!(one.scratchpad, 0);
    assert!(one.max_encoded > 1);
}
