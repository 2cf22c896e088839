//! The application contract served by the host, and an in-memory controller.

use std::sync::{Mutex, PoisonError};

use crate::types::{BtAddrLe, BtData, ID_MAX, IRK_ANY, Irk, MAX_NAME_LEN};

/// Invalid argument.
pub const EINVAL: i32 = 22;
/// No room for another identity.
pub const ENOMEM: i32 = 12;
/// Operation already done, or not allowed in the current state.
pub const EALREADY: i32 = 120;

/// Longest advertising or scan response payload, all elements included.
pub const ADV_DATA_MAX: usize = 31;

/// Completion callback of `bt_enable`.
pub type ReadyFn = Box<dyn FnOnce(i32) + Send>;

/// Bluetooth GAP operations, as the host application provides them.
///
/// Error codes follow the controller convention: zero or a positive value
/// on success, a negated errno on failure.
pub trait GapService: Send + Sync {
    /// Connectivity check: true for a positive `x`.
    fn test1(&self, x: i32) -> bool;

    /// Enable the stack. `ready` fires once enabling finished.
    fn bt_enable(&self, ready: Option<ReadyFn>) -> i32;

    /// Set the device name.
    fn bt_set_name(&self, name: &str) -> i32;

    /// Current device name, if one is set.
    fn bt_get_name(&self) -> Option<String>;

    /// Set the identity address used once the stack is enabled.
    fn bt_set_id_addr(&self, addr: BtAddrLe) -> i32;

    /// Up to `max` identity addresses.
    fn bt_id_get(&self, max: usize) -> Vec<BtAddrLe>;

    /// Create an identity and return its id.
    ///
    /// An address or key equal to its "any" value is generated and written
    /// back.
    fn bt_id_create(&self, addr: Option<&mut BtAddrLe>, irk: Option<&mut Irk>) -> i32;

    /// Replace advertising and scan response data.
    fn bt_le_adv_update_data(&self, ad: &[BtData<'_>], sd: &[BtData<'_>]) -> i32;
}

#[derive(Debug, Default)]
struct ControllerState {
    enabled: bool,
    name: Option<String>,
    ids: Vec<(BtAddrLe, Irk)>,
    ad: Vec<(u8, Vec<u8>)>,
    sd: Vec<(u8, Vec<u8>)>,
}

/// A controller that lives in memory.
#[derive(Debug, Default)]
pub struct SimController {
    state: Mutex<ControllerState>,
}

impl SimController {
    /// A disabled controller without a name or identities.
    pub fn new() -> Self {
        Self::default()
    }

    /// A disabled controller advertising `name`.
    pub fn with_name(name: &str) -> Self {
        let controller = Self::new();
        controller.state().name = Some(name.to_owned());
        controller
    }

    /// True once `bt_enable` succeeded.
    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    /// Advertising data currently set, as `(type, payload)` pairs.
    pub fn advertising_data(&self) -> Vec<(u8, Vec<u8>)> {
        self.state().ad.clone()
    }

    /// Scan response data currently set.
    pub fn scan_response_data(&self) -> Vec<(u8, Vec<u8>)> {
        self.state().sd.clone()
    }

    /// IRK of identity `id`.
    pub fn irk(&self, id: usize) -> Option<Irk> {
        self.state().ids.get(id).map(|(_, irk)| *irk)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generated_addr(n: usize) -> BtAddrLe {
        BtAddrLe::random_static([n as u8 + 1, 0x5a, 0xa5, 0x00, 0x17, 0x00])
    }
}

fn fits_adv_payload(data: &[BtData<'_>]) -> bool {
    data.iter().map(|element| 2 + element.data.len()).sum::<usize>() <= ADV_DATA_MAX
}

fn to_owned_data(data: &[BtData<'_>]) -> Vec<(u8, Vec<u8>)> {
    data.iter().map(|element| (element.kind, element.data.to_vec())).collect()
}

impl GapService for SimController {
    fn test1(&self, x: i32) -> bool {
        x > 0
    }

    fn bt_enable(&self, ready: Option<ReadyFn>) -> i32 {
        {
            let mut state = self.state();
            if state.enabled {
                return -EALREADY;
            }
            state.enabled = true;
            if state.ids.is_empty() {
                state.ids.push((Self::generated_addr(0), [1; 16]));
            }
        }
        tracing::info!("controller enabled");
        if let Some(ready) = ready {
            ready(0);
        }
        0
    }

    fn bt_set_name(&self, name: &str) -> i32 {
        if name.len() > MAX_NAME_LEN {
            return -EINVAL;
        }
        self.state().name = Some(name.to_owned());
        0
    }

    fn bt_get_name(&self) -> Option<String> {
        self.state().name.clone()
    }

    fn bt_set_id_addr(&self, addr: BtAddrLe) -> i32 {
        let mut state = self.state();
        if state.enabled {
            return -EALREADY;
        }
        if addr.is_any() {
            return -EINVAL;
        }
        match state.ids.first_mut() {
            Some(first) => first.0 = addr,
            None => state.ids.push((addr, IRK_ANY)),
        }
        0
    }

    fn bt_id_get(&self, max: usize) -> Vec<BtAddrLe> {
        self.state().ids.iter().take(max).map(|(addr, _)| *addr).collect()
    }

    fn bt_id_create(&self, addr: Option<&mut BtAddrLe>, irk: Option<&mut Irk>) -> i32 {
        let mut state = self.state();
        let id = state.ids.len();
        if id >= ID_MAX {
            return -ENOMEM;
        }

        let mut new_addr = Self::generated_addr(id);
        if let Some(addr) = addr {
            if addr.is_any() {
                *addr = new_addr;
            } else if state.ids.iter().any(|(existing, _)| existing == addr) {
                return -EALREADY;
            } else {
                new_addr = *addr;
            }
        }

        let mut new_irk = [id as u8 + 1; 16];
        if let Some(irk) = irk {
            if *irk == IRK_ANY {
                *irk = new_irk;
            } else {
                new_irk = *irk;
            }
        }

        state.ids.push((new_addr, new_irk));
        tracing::debug!(id, addr = %new_addr, "identity created");
        id as i32
    }

    fn bt_le_adv_update_data(&self, ad: &[BtData<'_>], sd: &[BtData<'_>]) -> i32 {
        if !fits_adv_payload(ad) || !fits_adv_payload(sd) {
            return -EINVAL;
        }
        let mut state = self.state();
        state.ad = to_owned_data(ad);
        state.sd = to_owned_data(sd);
        0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicI32, Ordering},
    };

    use super::*;

    #[test]
    fn enable_fires_ready_once() {
        let controller = SimController::new();
        let seen = Arc::new(AtomicI32::new(i32::MIN));
        let sink = Arc::clone(&seen);
        let ready: ReadyFn = Box::new(move |err| sink.store(err, Ordering::SeqCst));
        assert_eq!(controller.bt_enable(Some(ready)), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(controller.bt_enable(None), -EALREADY);
        assert_eq!(controller.bt_id_get(ID_MAX).len(), 1);
    }

    #[test]
    fn identity_address_is_fixed_after_enable() {
        let controller = SimController::new();
        let addr = BtAddrLe::random_static([1, 2, 3, 4, 5, 6]);
        assert_eq!(controller.bt_set_id_addr(BtAddrLe::ANY), -EINVAL);
        assert_eq!(controller.bt_set_id_addr(addr), 0);
        controller.bt_enable(None);
        assert_eq!(controller.bt_id_get(1), vec![addr]);
        assert_eq!(controller.bt_set_id_addr(addr), -EALREADY);
    }

    #[test]
    fn id_create_fills_in_defaults() {
        let controller = SimController::new();
        let mut addr = BtAddrLe::ANY;
        let mut irk = [9; 16];
        let id = controller.bt_id_create(Some(&mut addr), Some(&mut irk));
        assert_eq!(id, 0);
        assert!(!addr.is_any());
        assert_eq!(irk, [9; 16]);
        assert_eq!(controller.irk(0), Some([9; 16]));

        // same address again
        assert_eq!(controller.bt_id_create(Some(&mut addr), None), -EALREADY);
    }

    #[test]
    fn id_create_stops_at_capacity() {
        let controller = SimController::new();
        for id in 0..ID_MAX {
            assert_eq!(controller.bt_id_create(None, None), id as i32);
        }
        assert_eq!(controller.bt_id_create(None, None), -ENOMEM);
        assert_eq!(controller.bt_id_get(usize::MAX).len(), ID_MAX);
    }

    #[test]
    fn advertising_payload_is_limited() {
        let controller = SimController::new();
        let long = [0u8; 30];
        assert_eq!(controller.bt_le_adv_update_data(&[BtData::new(0xff, &long)], &[]), -EINVAL);
        assert_eq!(controller.bt_le_adv_update_data(&[BtData::new(0x01, &[0x06])], &[]), 0);
        assert_eq!(controller.advertising_data(), vec![(0x01, vec![0x06])]);
        assert!(controller.scan_response_data().is_empty());
    }

    #[test]
    fn name_is_optional() {
        assert_eq!(SimController::new().bt_get_name(), None);
        let controller = SimController::with_name("dev");
        assert_eq!(controller.bt_set_name("renamed"), 0);
        assert_eq!(controller.bt_get_name().as_deref(), Some("renamed"));
    }
}
