//! Wire types and operation ids of the `bt_rpc` group.

use stubwire_core::{Region, SizeError, SizeEstimate, WireShape};
use stubwire_proto::{DecodeCtx, EncodeCtx, Group, OperationId};

/// The GAP operation group.
pub const GROUP: Group = Group::new(0x01, "bt_rpc_grp");

/// Longest device name accepted by `bt_set_name`, in bytes.
pub const MAX_NAME_LEN: usize = 127;

/// Number of identities a controller can hold.
pub const ID_MAX: usize = 4;

/// Commands of the group.
pub mod cmd {
    use super::{GROUP, OperationId};

    /// `test1(x) -> bool`
    pub const TEST1: OperationId = OperationId::command(GROUP, 0x01);
    /// `bt_enable(cb) -> err`
    pub const BT_ENABLE: OperationId = OperationId::command(GROUP, 0x02);
    /// `bt_set_name(name) -> err`
    pub const BT_SET_NAME: OperationId = OperationId::command(GROUP, 0x03);
    /// `bt_get_name_out(size) -> (found, name)`
    pub const BT_GET_NAME_OUT: OperationId = OperationId::command(GROUP, 0x04);
    /// `bt_set_id_addr(addr) -> err`
    pub const BT_SET_ID_ADDR: OperationId = OperationId::command(GROUP, 0x05);
    /// `bt_id_get(count) -> addrs`
    pub const BT_ID_GET: OperationId = OperationId::command(GROUP, 0x06);
    /// `bt_id_create(addr?, irk?) -> id`
    pub const BT_ID_CREATE: OperationId = OperationId::command(GROUP, 0x07);
    /// `bt_le_adv_update_data(ad, sd) -> err`
    pub const BT_LE_ADV_UPDATE_DATA: OperationId = OperationId::command(GROUP, 0x08);
}

/// Events of the group.
pub mod evt {
    use super::{GROUP, OperationId};

    /// `bt_ready_cb(handle, err)`, sent by the host once enabling finished
    pub const BT_READY_CB: OperationId = OperationId::event(GROUP, 0x01);
}

/// Identity resolving key.
pub type Irk = [u8; 16];

/// The all-zero key, meaning "generate one".
pub const IRK_ANY: Irk = [0; 16];

/// LE device address with its type.
///
/// Travels as a raw 7-byte buffer: the type byte, then the address in
/// little-endian order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BtAddrLe {
    /// 0 public, 1 random
    pub kind: u8,
    /// Address bytes, least significant first
    pub addr: [u8; 6],
}

impl BtAddrLe {
    /// The "any" address, meaning "generate one".
    pub const ANY: Self = Self { kind: 0, addr: [0; 6] };

    /// Encoded length of the raw struct.
    pub const RAW_LEN: usize = 7;

    /// Random static address from its six bytes (the two top bits are forced).
    pub fn random_static(mut addr: [u8; 6]) -> Self {
        addr[5] |= 0xc0;
        Self { kind: 1, addr }
    }

    /// True for [`BtAddrLe::ANY`].
    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    /// Raw wire form.
    pub fn to_bytes(&self) -> [u8; 7] {
        let mut raw = [0; 7];
        raw[0] = self.kind;
        raw[1..].copy_from_slice(&self.addr);
        raw
    }

    /// Parse the raw wire form.
    pub fn from_bytes(raw: [u8; 7]) -> Self {
        let [kind, a0, a1, a2, a3, a4, a5] = raw;
        Self { kind, addr: [a0, a1, a2, a3, a4, a5] }
    }

    /// Bound of one encoded address.
    pub fn size_estimate() -> Result<SizeEstimate, SizeError> {
        SizeEstimate::raw(Self::RAW_LEN)
    }

    /// Encode as a raw buffer.
    pub fn encode(&self, ctx: &mut EncodeCtx) {
        ctx.encode_buffer(&self.to_bytes());
    }

    /// Decode the raw buffer.
    pub fn decode(ctx: &mut DecodeCtx<'_>) -> Self {
        Self::from_bytes(ctx.decode_fixed())
    }
}

impl std::fmt::Display for BtAddrLe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let a = &self.addr;
        let kind = if self.kind == 0 { "public" } else { "random" };
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X} ({kind})",
            a[5], a[4], a[3], a[2], a[1], a[0]
        )
    }
}

/// One advertising or scan response data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtData<'a> {
    /// AD type
    pub kind: u8,
    /// AD payload
    pub data: &'a [u8],
}

impl<'a> BtData<'a> {
    /// Smallest encoding of one element: a one-byte type and an empty buffer.
    pub const MIN_ENCODED: usize = 2;

    /// An element.
    pub fn new(kind: u8, data: &'a [u8]) -> Self {
        Self { kind, data }
    }

    /// Encode type then payload.
    pub fn encode(&self, ctx: &mut EncodeCtx) {
        ctx.encode_uint(u64::from(self.kind));
        ctx.encode_buffer(self.data);
    }

    /// Encode a whole array of elements.
    pub fn encode_all(items: &[Self], ctx: &mut EncodeCtx) {
        ctx.encode_array_header(items.len());
        for item in items {
            item.encode(ctx);
        }
    }
}

impl WireShape for BtData<'_> {
    fn size_estimate(&self) -> Result<SizeEstimate, SizeError> {
        SizeEstimate::scalar::<u8>().plus(SizeEstimate::buffer(self.data.len())?)
    }
}

/// A [`BtData`] element whose payload lives in a scratchpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataRegion {
    /// AD type
    pub kind: u8,
    /// Payload region
    pub data: Region,
}
