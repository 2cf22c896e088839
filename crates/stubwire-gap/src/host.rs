//! Host handlers of the `bt_rpc` group.
//!
//! Each handler decodes the arguments written by the matching stub in
//! [`crate::client`], calls the [`GapService`] and encodes its result. The
//! only event the host sends, `bt_ready_cb`, goes out through the [`Caller`]
//! given to [`register_host`].

use std::sync::Arc;

use stubwire_core::{
    Caller, HostOperation, Registry, RegistryBuilder, RegistryError, RemoteCallback, Request,
    RpcConfig, Scratchpad, Served, SizeError, SizeEstimate, StrRegion,
};
use stubwire_proto::{CallbackHandle, DecodeCtx, DecodeFault, EncodeCtx, OperationId, bounds};

use crate::{
    client::nullable_raw,
    flags::{AddrIrkFlags, response_fields, restore_defaults},
    service::{GapService, ReadyFn},
    types::{BtAddrLe, BtData, DataRegion, Irk, MAX_NAME_LEN, cmd, evt},
};

fn errno_size(_err: &i32) -> Result<SizeEstimate, SizeError> {
    Ok(SizeEstimate::scalar::<i32>())
}

fn encode_errno(err: i32, ctx: &mut EncodeCtx) {
    ctx.encode_int(i64::from(err));
}

/// Serves `test1`.
#[derive(Debug)]
pub struct Test1Handler<S>(pub Arc<S>);

impl<S: GapService> HostOperation for Test1Handler<S> {
    type Args = i32;
    type Output = bool;

    fn id(&self) -> OperationId {
        cmd::TEST1
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> i32 {
        ctx.decode_i32()
    }

    fn execute(&self, x: i32, _pad: &Scratchpad) -> bool {
        self.0.test1(x)
    }

    fn response_size(&self, _output: &bool) -> Result<SizeEstimate, SizeError> {
        Ok(SizeEstimate::encoded(bounds::BOOL))
    }

    fn encode_response(&self, output: &bool, ctx: &mut EncodeCtx) {
        ctx.encode_bool(*output);
    }
}

/// `bt_ready_cb(handle, err)`, sent back to the client.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    /// Client trampoline
    pub handle: CallbackHandle,
    /// Result of enabling
    pub err: i32,
}

impl Request for ReadyEvent {
    fn id(&self) -> OperationId {
        evt::BT_READY_CB
    }

    fn request_size(&self) -> Result<SizeEstimate, SizeError> {
        SizeEstimate::callback().plus(SizeEstimate::scalar::<i32>())
    }

    fn encode_request(&self, ctx: &mut EncodeCtx) {
        ctx.encode_callback(Some(self.handle));
        ctx.encode_int(i64::from(self.err));
    }
}

/// Serves `bt_enable`, firing the client's ready callback.
#[derive(Debug)]
pub struct EnableHandler<S> {
    service: Arc<S>,
    events: Caller,
}

impl<S: GapService> HostOperation for EnableHandler<S> {
    type Args = Option<CallbackHandle>;
    type Output = i32;

    fn id(&self) -> OperationId {
        cmd::BT_ENABLE
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> Option<CallbackHandle> {
        ctx.decode_callback()
    }

    fn execute(&self, handle: Option<CallbackHandle>, _pad: &Scratchpad) -> i32 {
        let ready = handle.map(|handle| {
            let remote = RemoteCallback::new(handle, self.events.clone());
            Box::new(move |err: i32| {
                if let Err(error) = remote.invoke(|handle| ReadyEvent { handle, err }) {
                    tracing::warn!(%handle, %error, "bt_ready_cb not delivered");
                }
            }) as ReadyFn
        });
        self.service.bt_enable(ready)
    }

    fn response_size(&self, err: &i32) -> Result<SizeEstimate, SizeError> {
        errno_size(err)
    }

    fn encode_response(&self, err: &i32, ctx: &mut EncodeCtx) {
        encode_errno(*err, ctx);
    }
}

/// Serves `bt_set_name`.
#[derive(Debug)]
pub struct SetNameHandler<S>(pub Arc<S>);

impl<S: GapService> HostOperation for SetNameHandler<S> {
    type Args = StrRegion;
    type Output = i32;

    fn id(&self) -> OperationId {
        cmd::BT_SET_NAME
    }

    fn has_variable_args(&self) -> bool {
        true
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, pad: &mut Scratchpad) -> StrRegion {
        let name = pad.decode_str(ctx);
        if name.len() > MAX_NAME_LEN {
            ctx.fail(DecodeFault::LimitExceeded {
                field: "name",
                value: name.len() as u64,
                limit: MAX_NAME_LEN as u64,
            });
        }
        name
    }

    fn execute(&self, name: StrRegion, pad: &Scratchpad) -> i32 {
        self.0.bt_set_name(pad.str(name))
    }

    fn response_size(&self, err: &i32) -> Result<SizeEstimate, SizeError> {
        errno_size(err)
    }

    fn encode_response(&self, err: &i32, ctx: &mut EncodeCtx) {
        encode_errno(*err, ctx);
    }
}

/// Longest prefix of `name` that fits in `size` bytes without splitting a
/// character.
fn truncate_name(name: &str, size: usize) -> &str {
    let mut end = size.min(name.len());
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.get(..end).unwrap_or_default()
}

/// Serves `bt_get_name_out`.
#[derive(Debug)]
pub struct GetNameOutHandler<S>(pub Arc<S>);

impl<S: GapService> HostOperation for GetNameOutHandler<S> {
    type Args = usize;
    type Output = (bool, String);

    fn id(&self) -> OperationId {
        cmd::BT_GET_NAME_OUT
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> usize {
        usize::try_from(ctx.decode_uint()).unwrap_or(usize::MAX)
    }

    fn execute(&self, size: usize, _pad: &Scratchpad) -> (bool, String) {
        match self.0.bt_get_name() {
            Some(name) => (true, truncate_name(&name, size).to_owned()),
            None => (false, String::new()),
        }
    }

    fn has_variable_response(&self) -> bool {
        true
    }

    fn response_size(&self, (_, name): &(bool, String)) -> Result<SizeEstimate, SizeError> {
        SizeEstimate::encoded(bounds::BOOL).plus(SizeEstimate::str(name.len())?)
    }

    fn encode_response(&self, (found, name): &(bool, String), ctx: &mut EncodeCtx) {
        ctx.encode_bool(*found);
        ctx.encode_str(name);
    }
}

/// Serves `bt_set_id_addr`.
#[derive(Debug)]
pub struct SetIdAddrHandler<S>(pub Arc<S>);

impl<S: GapService> HostOperation for SetIdAddrHandler<S> {
    type Args = BtAddrLe;
    type Output = i32;

    fn id(&self) -> OperationId {
        cmd::BT_SET_ID_ADDR
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> BtAddrLe {
        BtAddrLe::decode(ctx)
    }

    fn execute(&self, addr: BtAddrLe, _pad: &Scratchpad) -> i32 {
        self.0.bt_set_id_addr(addr)
    }

    fn response_size(&self, err: &i32) -> Result<SizeEstimate, SizeError> {
        errno_size(err)
    }

    fn encode_response(&self, err: &i32, ctx: &mut EncodeCtx) {
        encode_errno(*err, ctx);
    }
}

/// Serves `bt_id_get`.
#[derive(Debug)]
pub struct IdGetHandler<S>(pub Arc<S>);

impl<S: GapService> HostOperation for IdGetHandler<S> {
    type Args = usize;
    type Output = Vec<BtAddrLe>;

    fn id(&self) -> OperationId {
        cmd::BT_ID_GET
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> usize {
        usize::try_from(ctx.decode_uint()).unwrap_or(usize::MAX)
    }

    fn execute(&self, count: usize, _pad: &Scratchpad) -> Vec<BtAddrLe> {
        let mut addrs = self.0.bt_id_get(count);
        addrs.truncate(count);
        addrs
    }

    fn response_size(&self, addrs: &Vec<BtAddrLe>) -> Result<SizeEstimate, SizeError> {
        SizeEstimate::array_head(addrs.len()).plus(BtAddrLe::size_estimate()?.repeat(addrs.len())?)
    }

    fn encode_response(&self, addrs: &Vec<BtAddrLe>, ctx: &mut EncodeCtx) {
        ctx.encode_array_header(addrs.len());
        for addr in addrs {
            addr.encode(ctx);
        }
    }
}

/// Serves `bt_id_create`.
#[derive(Debug)]
pub struct IdCreateHandler<S>(pub Arc<S>);

impl<S: GapService> HostOperation for IdCreateHandler<S> {
    type Args = (AddrIrkFlags, Option<BtAddrLe>, Option<Irk>);
    type Output = (i32, Option<BtAddrLe>, Option<Irk>);

    fn id(&self) -> OperationId {
        cmd::BT_ID_CREATE
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, _pad: &mut Scratchpad) -> Self::Args {
        let position = ctx.position();
        let bits = ctx.decode_u8();
        let Some(flags) = AddrIrkFlags::from_bits(bits).filter(|flags| flags.is_consistent()) else {
            ctx.fail(DecodeFault::Invalid { position, reason: format!("flags {bits:#04x}") });
            return (AddrIrkFlags::empty(), None, None);
        };

        let position = ctx.position();
        let has_addr = ctx.decode_present();
        if has_addr != flags.sends_addr() && ctx.is_ok() {
            let reason = "address disagrees with flags".into();
            ctx.fail(DecodeFault::Invalid { position, reason });
        }
        let addr = if has_addr { Some(BtAddrLe::decode(ctx)) } else { None };

        let position = ctx.position();
        let has_irk = ctx.decode_present();
        if has_irk != flags.sends_irk() && ctx.is_ok() {
            ctx.fail(DecodeFault::Invalid { position, reason: "irk disagrees with flags".into() });
        }
        let irk = if has_irk { Some(ctx.decode_fixed::<16>()) } else { None };

        (flags, addr, irk)
    }

    fn execute(&self, (flags, addr, irk): Self::Args, _pad: &Scratchpad) -> Self::Output {
        let (mut addr, mut irk) = restore_defaults(flags, addr, irk);
        let id = self.0.bt_id_create(addr.as_mut(), irk.as_mut());
        if id < 0 {
            return (id, None, None);
        }
        let (addr, irk) = response_fields(flags, addr, irk);
        (id, addr, irk)
    }

    fn response_size(&self, (_, addr, irk): &Self::Output) -> Result<SizeEstimate, SizeError> {
        SizeEstimate::sum([
            Ok(SizeEstimate::scalar::<i32>()),
            nullable_raw(addr.is_some(), BtAddrLe::RAW_LEN),
            nullable_raw(irk.is_some(), size_of::<Irk>()),
        ])
    }

    fn encode_response(&self, (id, addr, irk): &Self::Output, ctx: &mut EncodeCtx) {
        ctx.encode_int(i64::from(*id));
        match addr {
            Some(addr) => addr.encode(ctx),
            None => ctx.encode_null(),
        }
        match irk {
            Some(irk) => ctx.encode_buffer(irk),
            None => ctx.encode_null(),
        }
    }
}

fn decode_data(ctx: &mut DecodeCtx<'_>, pad: &mut Scratchpad) -> Vec<DataRegion> {
    let count = ctx.decode_array_header(BtData::MIN_ENCODED);
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let kind = ctx.decode_u8();
        let data = pad.decode_buffer(ctx);
        if !ctx.is_ok() {
            break;
        }
        items.push(DataRegion { kind, data });
    }
    items
}

fn resolve<'p>(items: &[DataRegion], pad: &'p Scratchpad) -> Vec<BtData<'p>> {
    items.iter().map(|item| BtData::new(item.kind, pad.bytes(item.data))).collect()
}

/// Serves `bt_le_adv_update_data`.
#[derive(Debug)]
pub struct AdvUpdateDataHandler<S>(pub Arc<S>);

impl<S: GapService> HostOperation for AdvUpdateDataHandler<S> {
    type Args = (Vec<DataRegion>, Vec<DataRegion>);
    type Output = i32;

    fn id(&self) -> OperationId {
        cmd::BT_LE_ADV_UPDATE_DATA
    }

    fn has_variable_args(&self) -> bool {
        true
    }

    fn decode(&self, ctx: &mut DecodeCtx<'_>, pad: &mut Scratchpad) -> Self::Args {
        let ad = decode_data(ctx, pad);
        let sd = decode_data(ctx, pad);
        (ad, sd)
    }

    fn execute(&self, (ad, sd): Self::Args, pad: &Scratchpad) -> i32 {
        self.0.bt_le_adv_update_data(&resolve(&ad, pad), &resolve(&sd, pad))
    }

    fn response_size(&self, err: &i32) -> Result<SizeEstimate, SizeError> {
        errno_size(err)
    }

    fn encode_response(&self, err: &i32, ctx: &mut EncodeCtx) {
        encode_errno(*err, ctx);
    }
}

/// Add every `bt_rpc` command handler to `builder`.
///
/// `events` is the link back to the client, used for `bt_ready_cb`.
pub fn register_host<S: GapService + 'static>(
    builder: &mut RegistryBuilder,
    service: &Arc<S>,
    events: Caller,
) -> Result<(), RegistryError> {
    builder
        .register(Served(Test1Handler(Arc::clone(service))))?
        .register(Served(EnableHandler { service: Arc::clone(service), events }))?
        .register(Served(SetNameHandler(Arc::clone(service))))?
        .register(Served(GetNameOutHandler(Arc::clone(service))))?
        .register(Served(SetIdAddrHandler(Arc::clone(service))))?
        .register(Served(IdGetHandler(Arc::clone(service))))?
        .register(Served(IdCreateHandler(Arc::clone(service))))?
        .register(Served(AdvUpdateDataHandler(Arc::clone(service))))?;
    tracing::debug!(group = %crate::types::GROUP.name(), "gap host handlers registered");
    Ok(())
}

/// A host registry serving `service` with the default reporter.
pub fn host_registry<S: GapService + 'static>(
    service: &Arc<S>,
    events: Caller,
    config: RpcConfig,
) -> Result<Registry, RegistryError> {
    let mut builder = RegistryBuilder::new(config);
    register_host(&mut builder, service, events)?;
    Ok(builder.build())
}
