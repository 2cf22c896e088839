//! Bluetooth GAP sample service over stubwire.
//!
//! The `bt_rpc` group exercises every argument shape the protocol supports:
//!
//! | Operation | Shape |
//! |---|---|
//! | `test1` | fixed scalars |
//! | `bt_enable` | callback argument, answered later by the `bt_ready_cb` event |
//! | `bt_set_name` | variable string, at most [`MAX_NAME_LEN`] bytes |
//! | `bt_get_name_out` | variable response copied into caller storage |
//! | `bt_set_id_addr` | raw struct as a fixed buffer |
//! | `bt_id_get` | response array sized by the host output |
//! | `bt_id_create` | nullable in/out fields with presence flags |
//! | `bt_le_adv_update_data` | arrays of structs with variable payloads |
//!
//! The client side is [`GapClient`]; the host side is [`register_host`]
//! over any [`GapService`]. [`SimController`] is an in-memory controller.
#![forbid(unsafe_code)]

pub mod client;
pub mod flags;
pub mod host;
pub mod service;
pub mod types;

pub use client::{GapClient, NAME_CACHE_LEN, NameOut};
pub use flags::{
    AddrIrkFlags, apply_addr_irk_flags, response_fields, restore_defaults, strip_defaults,
};
pub use host::{ReadyEvent, host_registry, register_host};
pub use service::{ADV_DATA_MAX, EALREADY, EINVAL, ENOMEM, GapService, ReadyFn, SimController};
pub use types::{BtAddrLe, BtData, DataRegion, GROUP, ID_MAX, IRK_ANY, Irk, MAX_NAME_LEN, cmd, evt};
