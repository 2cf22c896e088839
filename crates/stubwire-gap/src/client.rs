//! Client stubs of the `bt_rpc` group.
//!
//! Each operation is a [`Request`]/[`Command`] pair; [`GapClient`] wraps them
//! in the signatures application code expects. The client also serves one
//! event, `bt_ready_cb`, which runs the callback passed to
//! [`GapClient::bt_enable`].

use std::sync::Arc;

use stubwire_core::{
    CallbackRegistry, Caller, Command, HostOperation, Registry, RegistryBuilder, RegistryError,
    Request, Result, RpcConfig, RpcError, Scratchpad, Served, SizeError, SizeEstimate, StrRegion,
    WireShape,
};
use stubwire_proto::{CallbackHandle, DecodeCtx, DecodeFault, EncodeCtx, OperationId, bounds};

use crate::{
    flags::{AddrIrkFlags, apply_addr_irk_flags, strip_defaults},
    service::ReadyFn,
    types::{BtAddrLe, BtData, Irk, MAX_NAME_LEN, cmd, evt},
};

/// Size of the buffer [`GapClient::bt_get_name`] reads into.
pub const NAME_CACHE_LEN: usize = MAX_NAME_LEN + 1;

/// `test1(x) -> bool`
#[derive(Debug, Clone, Copy)]
pub struct Test1(pub i32);

impl Request for Test1 {
    fn id(&self) -> OperationId {
        cmd::TEST1
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        Ok(SizeEstimate::scalar::<i32>())
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        ctx.encode_int(i64::from(self.0));
    }
}

impl Command for Test1 {
    type Decoded = bool;
    type Response = bool;

    fn decode_response(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> bool {
        ctx.decode_bool()
    }

    fn complete(self, result: bool, _pad: &Scratchpad) -> std::result::Result<bool, DecodeFault> {
        Ok(result)
    }
}

/// `bt_enable(cb) -> err`
#[derive(Debug, Clone, Copy)]
pub struct BtEnable {
    /// Trampoline registered for the ready callback
    pub ready: Option<CallbackHandle>,
}

impl Request for BtEnable {
    fn id(&self) -> OperationId {
        cmd::BT_ENABLE
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        Ok(SizeEstimate::callback())
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        ctx.encode_callback(self.ready);
    }
}

/// `bt_set_name(name) -> err`
#[derive(Debug, Clone, Copy)]
pub struct BtSetName<'a>(pub &'a str);

impl Request for BtSetName<'_> {
    fn id(&self) -> OperationId {
        cmd::BT_SET_NAME
    }

    fn has_variable_args(&self) -> bool {
        true
    }

    fn check_limits(&self) -> Result<()> {
        if self.0.len() > MAX_NAME_LEN {
            let len = self.0.len();
            return Err(RpcError::LimitExceeded { field: "name", len, max: MAX_NAME_LEN });
        }
        Ok(())
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        SizeEstimate::str(self.0.len())
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        ctx.encode_str(self.0);
    }
}

/// Result of [`GapClient::bt_get_name_out`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameOut {
    /// False if the controller has no name
    pub found: bool,
    /// Bytes written to the caller's buffer
    pub len: usize,
}

/// `bt_get_name_out(size) -> (found, name)`, copying into `buf`.
#[derive(Debug)]
pub struct BtGetNameOut<'a> {
    /// Caller storage; its length is the `size` sent
    pub buf: &'a mut [u8],
}

impl Request for BtGetNameOut<'_> {
    fn id(&self) -> OperationId {
        cmd::BT_GET_NAME_OUT
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        Ok(SizeEstimate::encoded(bounds::uint(self.buf.len() as u64)))
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        ctx.encode_uint(self.buf.len() as u64);
    }
}

impl Command for BtGetNameOut<'_> {
    type Decoded = (bool, StrRegion);
    type Response = NameOut;

    fn has_variable_response(&self) -> bool {
        true
    }

    fn decode_response(&self, ctx: &mut DecodeCtx<'_>, pad: &mut Scratchpad) -> (bool, StrRegion) {
        let found = ctx.decode_bool();
        let name = pad.decode_str(ctx);
        (found, name)
    }

    fn complete(
        self,
        (found, name): (bool, StrRegion),
        pad: &Scratchpad,
    ) -> std::result::Result<NameOut, DecodeFault> {
        let name = pad.str(name).as_bytes();
        let Some(dst) = self.buf.get_mut(..name.len()) else {
            return Err(DecodeFault::LimitExceeded {
                field: "name",
                value: name.len() as u64,
                limit: self.buf.len() as u64,
            });
        };
        dst.copy_from_slice(name);
        Ok(NameOut { found, len: name.len() })
    }
}

/// `bt_set_id_addr(addr) -> err`
#[derive(Debug, Clone, Copy)]
pub struct BtSetIdAddr(pub BtAddrLe);

impl Request for BtSetIdAddr {
    fn id(&self) -> OperationId {
        cmd::BT_SET_ID_ADDR
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        BtAddrLe::size_estimate()
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        self.0.encode(ctx);
    }
}

/// `bt_id_get(count) -> addrs`, filling `out`.
#[derive(Debug)]
pub struct BtIdGet<'a> {
    /// Caller storage; its length is the `count` sent
    pub out: &'a mut [BtAddrLe],
}

impl Request for BtIdGet<'_> {
    fn id(&self) -> OperationId {
        cmd::BT_ID_GET
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        Ok(SizeEstimate::encoded(bounds::uint(self.out.len() as u64)))
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        ctx.encode_uint(self.out.len() as u64);
    }
}

impl Command for BtIdGet<'_> {
    type Decoded = Vec<BtAddrLe>;
    type Response = usize;

    fn decode_response(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> Vec<BtAddrLe> {
        let count = ctx.decode_array_header(BtAddrLe::RAW_LEN + 1);
        if count > self.out.len() {
            ctx.fail(DecodeFault::LimitExceeded {
                field: "addrs",
                value: count as u64,
                limit: self.out.len() as u64,
            });
            return Vec::new();
        }
        (0..count).map(|_| BtAddrLe::decode(ctx)).collect()
    }

    fn complete(
        self,
        addrs: Vec<BtAddrLe>,
        _pad: &Scratchpad,
    ) -> std::result::Result<usize, DecodeFault> {
        for (slot, addr) in self.out.iter_mut().zip(&addrs) {
            *slot = *addr;
        }
        Ok(addrs.len())
    }
}

/// `bt_id_create(addr?, irk?) -> id`, writing generated values back.
#[derive(Debug)]
pub struct BtIdCreate<'a> {
    addr: Option<&'a mut BtAddrLe>,
    irk: Option<&'a mut Irk>,
    flags: AddrIrkFlags,
    wire_addr: Option<BtAddrLe>,
    wire_irk: Option<Irk>,
}

impl<'a> BtIdCreate<'a> {
    /// Prepare the call; only non-default values will travel.
    pub fn new(addr: Option<&'a mut BtAddrLe>, irk: Option<&'a mut Irk>) -> Self {
        let flags = apply_addr_irk_flags(addr.as_deref(), irk.as_deref());
        let (wire_addr, wire_irk) = strip_defaults(flags, addr.as_deref(), irk.as_deref());
        Self { addr, irk, flags, wire_addr, wire_irk }
    }

    /// Flags that will be sent.
    pub fn flags(&self) -> AddrIrkFlags {
        self.flags
    }
}

/// Bound of a nullable raw field.
pub(crate) fn nullable_raw(
    present: bool,
    len: usize,
) -> std::result::Result<SizeEstimate, SizeError> {
    Ok(SizeEstimate::nullable(present.then(|| SizeEstimate::raw(len)).transpose()?))
}

impl Request for BtIdCreate<'_> {
    fn id(&self) -> OperationId {
        cmd::BT_ID_CREATE
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        SizeEstimate::sum([
            Ok(SizeEstimate::scalar::<u8>()),
            nullable_raw(self.wire_addr.is_some(), BtAddrLe::RAW_LEN),
            nullable_raw(self.wire_irk.is_some(), size_of::<Irk>()),
        ])
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        ctx.encode_uint(u64::from(self.flags.bits()));
        match &self.wire_addr {
            Some(addr) => addr.encode(ctx),
            None => ctx.encode_null(),
        }
        match &self.wire_irk {
            Some(irk) => ctx.encode_buffer(irk),
            None => ctx.encode_null(),
        }
    }
}

impl Command for BtIdCreate<'_> {
    type Decoded = (i32, Option<BtAddrLe>, Option<Irk>);
    type Response = i32;

    fn decode_response(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> Self::Decoded {
        let id = ctx.decode_i32();

        let position = ctx.position();
        let addr = if ctx.decode_present() { Some(BtAddrLe::decode(ctx)) } else { None };
        if addr.is_some() && !self.flags.returns_addr() {
            ctx.fail(DecodeFault::Invalid { position, reason: "address was not requested".into() });
        }

        let position = ctx.position();
        let irk = if ctx.decode_present() { Some(ctx.decode_fixed::<16>()) } else { None };
        if irk.is_some() && !self.flags.returns_irk() {
            ctx.fail(DecodeFault::Invalid { position, reason: "irk was not requested".into() });
        }
        (id, addr, irk)
    }

    fn complete(
        self,
        (id, addr, irk): Self::Decoded,
        _pad: &Scratchpad,
    ) -> std::result::Result<i32, DecodeFault> {
        if let (Some(out), Some(addr)) = (self.addr, addr) {
            *out = addr;
        }
        if let (Some(out), Some(irk)) = (self.irk, irk) {
            *out = irk;
        }
        Ok(id)
    }
}

/// `bt_le_adv_update_data(ad, sd) -> err`
#[derive(Debug, Clone, Copy)]
pub struct BtLeAdvUpdateData<'a> {
    /// Advertising data
    pub ad: &'a [BtData<'a>],
    /// Scan response data
    pub sd: &'a [BtData<'a>],
}

impl Request for BtLeAdvUpdateData<'_> {
    fn id(&self) -> OperationId {
        cmd::BT_LE_ADV_UPDATE_DATA
    }

    fn has_variable_args(&self) -> bool {
        true
    }

    fn request_size(&self) -> std::result::Result<SizeEstimate, SizeError> {
        self.ad.size_estimate()?.plus(self.sd.size_estimate()?)
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        BtData::encode_all(self.ad, ctx);
        BtData::encode_all(self.sd, ctx);
    }
}

/// Commands answered by a single errno-style `i32`.
macro_rules! errno_response {
    ($($command:ty),+ $(,)?) => {$(
        impl Command for $command {
            type Decoded = i32;
            type Response = i32;

            fn decode_response(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> i32 {
                ctx.decode_i32()
            }

            fn complete(
                self,
                err: i32,
                _pad: &Scratchpad,
            ) -> std::result::Result<i32, DecodeFault> {
                Ok(err)
            }
        }
    )+};
}

errno_response!(BtEnable, BtSetName<'_>, BtSetIdAddr, BtLeAdvUpdateData<'_>);

/// Client-side handler of the `bt_ready_cb` event.
#[derive(Debug)]
pub struct ReadyCallbacks {
    callbacks: Arc<CallbackRegistry<i32>>,
}

impl HostOperation for ReadyCallbacks {
    type Args = (Option<CallbackHandle>, i32);
    type Output = ();

    fn id(&self) -> OperationId {
        evt::BT_READY_CB
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> Self::Args {
        let position = ctx.position();
        let handle = ctx.decode_callback();
        if handle.is_none() && ctx.is_ok() {
            let reason = "ready event without a callback".into();
            ctx.fail(DecodeFault::Invalid { position, reason });
        }
        (handle, ctx.decode_i32())
    }

    fn execute(&self, (handle, err): Self::Args, _pad: &Scratchpad) {
        let Some(handle) = handle else { return };
        if let Err(error) = self.callbacks.invoke(handle, err) {
            tracing::warn!(%error, "ready callback dropped");
        }
    }
}

/// GAP API backed by a remote controller.
#[derive(Debug, Clone)]
pub struct GapClient {
    caller: Caller,
    callbacks: Arc<CallbackRegistry<i32>>,
}

impl GapClient {
    /// A client calling through `caller`.
    pub fn new(caller: Caller) -> Self {
        let callbacks = Arc::new(CallbackRegistry::new(caller.config().callback_policy));
        Self { caller, callbacks }
    }

    /// The underlying caller.
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    /// Ready callbacks not yet fired.
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Event table the host's callbacks are delivered to.
    ///
    /// Serve it on the link the host sends events over.
    pub fn event_registry(
        &self,
        config: RpcConfig,
    ) -> std::result::Result<Registry, RegistryError> {
        let mut builder = RegistryBuilder::new(config);
        self.register_events(&mut builder)?;
        Ok(builder.build())
    }

    /// Add the client's event handlers to `builder`.
    pub fn register_events(
        &self,
        builder: &mut RegistryBuilder,
    ) -> std::result::Result<(), RegistryError> {
        builder.register(Served(ReadyCallbacks { callbacks: Arc::clone(&self.callbacks) }))?;
        Ok(())
    }

    /// `x > 0`, evaluated by the host.
    pub fn test1(&self, x: i32) -> Result<bool> {
        self.caller.call(Test1(x))
    }

    /// Enable the stack; `ready` runs when the host reports completion.
    pub fn bt_enable(&self, ready: Option<ReadyFn>) -> Result<i32> {
        let handle = ready.map(|ready| {
            let mut ready = Some(ready);
            self.callbacks.register(move |err| {
                if let Some(ready) = ready.take() {
                    ready(err);
                }
            })
        });

        let result = self.caller.call(BtEnable { ready: handle });
        // the host only fires the callback when enabling was accepted
        if let Some(handle) = handle.filter(|_| !matches!(result, Ok(0))) {
            self.callbacks.unregister(handle);
        }
        result
    }

    /// Set the device name.
    ///
    /// # Errors
    ///
    /// [`RpcError::LimitExceeded`] for names over [`MAX_NAME_LEN`] bytes,
    /// without sending anything.
    pub fn bt_set_name(&self, name: &str) -> Result<i32> {
        self.caller.call(BtSetName(name))
    }

    /// Copy the device name into `buf`.
    pub fn bt_get_name_out(&self, buf: &mut [u8]) -> Result<NameOut> {
        self.caller.call(BtGetNameOut { buf })
    }

    /// The device name, read through a [`NAME_CACHE_LEN`] buffer.
    pub fn bt_get_name(&self) -> Result<Option<String>> {
        let mut cache = [0u8; NAME_CACHE_LEN];
        let out = self.bt_get_name_out(&mut cache)?;
        let name = cache.get(..out.len).unwrap_or_default();
        Ok(out.found.then(|| String::from_utf8_lossy(name).into_owned()))
    }

    /// Set the identity address.
    pub fn bt_set_id_addr(&self, addr: BtAddrLe) -> Result<i32> {
        self.caller.call(BtSetIdAddr(addr))
    }

    /// Fill `out` with identity addresses; returns how many were written.
    pub fn bt_id_get(&self, out: &mut [BtAddrLe]) -> Result<usize> {
        self.caller.call(BtIdGet { out })
    }

    /// Create an identity. "Any" values are generated and written back.
    pub fn bt_id_create(&self, addr: Option<&mut BtAddrLe>, irk: Option<&mut Irk>) -> Result<i32> {
        self.caller.call(BtIdCreate::new(addr, irk))
    }

    /// Replace advertising and scan response data.
    pub fn bt_le_adv_update_data(&self, ad: &[BtData<'_>], sd: &[BtData<'_>]) -> Result<i32> {
        self.caller.call(BtLeAdvUpdateData { ad, sd })
    }
}
