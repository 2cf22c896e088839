#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use stubwire_core::{Caller, RpcConfig};
use stubwire_gap::{GapService, ID_MAX, MAX_NAME_LEN, SimController, cmd, host_registry};
use stubwire_harness::LoopbackTransport;

const COMMANDS: [stubwire_proto::OperationId; 8] = [
    cmd::TEST1,
    cmd::BT_ENABLE,
    cmd::BT_SET_NAME,
    cmd::BT_GET_NAME_OUT,
    cmd::BT_SET_ID_ADDR,
    cmd::BT_ID_GET,
    cmd::BT_ID_CREATE,
    cmd::BT_LE_ADV_UPDATE_DATA,
];

// Arbitrary bytes delivered to a host handler must never panic or leave
// the controller outside its limits.
fuzz_target!(|data: &[u8]| {
    let Some((&selector, message)) = data.split_first() else {
        return;
    };
    let op = COMMANDS[usize::from(selector) % COMMANDS.len()];

    let controller = Arc::new(SimController::new());
    let events = Caller::new(Arc::new(LoopbackTransport::new()), RpcConfig::default());
    let Ok(registry) = host_registry(&controller, events, RpcConfig::default()) else {
        return;
    };
    let _ = registry.deliver(op.route_key(), message);

    assert!(controller.bt_get_name().is_none_or(|name| name.len() <= MAX_NAME_LEN));
    assert!(controller.bt_id_get(usize::MAX).len() <= ID_MAX);
    assert_eq!(registry.pool().in_use(), 0);
});
