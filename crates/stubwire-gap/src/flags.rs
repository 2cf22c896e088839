//! Presence flags for `bt_id_create`.
//!
//! `bt_id_create` takes an optional address and an optional IRK, both in/out:
//! a caller passing the "any" value asks the controller to generate one and
//! write it back. Default values carry no information, so they never travel:
//! the request sends a flags byte describing what the caller passed and
//! nulls out default fields, and the response only carries the fields the
//! controller filled in.
//!
//! Each step is a pure function so the client and the host apply the exact
//! mirror of each other:
//!
//! ```text
//! client: apply_addr_irk_flags -> strip_defaults  -> encode
//! host:   decode -> restore_defaults -> execute -> response_fields -> encode
//! ```

use bitflags::bitflags;

use crate::types::{BtAddrLe, IRK_ANY, Irk};

bitflags! {
    /// What the caller of `bt_id_create` passed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AddrIrkFlags: u8 {
        /// An address buffer was passed
        const ADDR = 0b0000_0001;
        /// ...and it holds the "any" address
        const ADDR_DEFAULT = 0b0000_0010;
        /// An IRK buffer was passed
        const IRK = 0b0000_0100;
        /// ...and it holds the all-zero key
        const IRK_DEFAULT = 0b0000_1000;
    }
}

impl AddrIrkFlags {
    /// True if the bits are a combination the client can produce: a
    /// default bit never appears without its presence bit.
    pub fn is_consistent(self) -> bool {
        (!self.contains(Self::ADDR_DEFAULT) || self.contains(Self::ADDR))
            && (!self.contains(Self::IRK_DEFAULT) || self.contains(Self::IRK))
    }

    /// True if the request carries an address value.
    pub fn sends_addr(self) -> bool {
        self.contains(Self::ADDR) && !self.contains(Self::ADDR_DEFAULT)
    }

    /// True if the request carries an IRK value.
    pub fn sends_irk(self) -> bool {
        self.contains(Self::IRK) && !self.contains(Self::IRK_DEFAULT)
    }

    /// True if the response carries the generated address.
    pub fn returns_addr(self) -> bool {
        self.contains(Self::ADDR | Self::ADDR_DEFAULT)
    }

    /// True if the response carries the generated IRK.
    pub fn returns_irk(self) -> bool {
        self.contains(Self::IRK | Self::IRK_DEFAULT)
    }
}

/// Describe the caller's arguments.
pub fn apply_addr_irk_flags(addr: Option<&BtAddrLe>, irk: Option<&Irk>) -> AddrIrkFlags {
    let mut flags = AddrIrkFlags::empty();
    if let Some(addr) = addr {
        flags |= AddrIrkFlags::ADDR;
        flags.set(AddrIrkFlags::ADDR_DEFAULT, addr.is_any());
    }
    if let Some(irk) = irk {
        flags |= AddrIrkFlags::IRK;
        flags.set(AddrIrkFlags::IRK_DEFAULT, *irk == IRK_ANY);
    }
    flags
}

/// Values that must travel in the request.
pub fn strip_defaults(
    flags: AddrIrkFlags,
    addr: Option<&BtAddrLe>,
    irk: Option<&Irk>,
) -> (Option<BtAddrLe>, Option<Irk>) {
    (
        addr.copied().filter(|_| flags.sends_addr()),
        irk.copied().filter(|_| flags.sends_irk()),
    )
}

/// Rebuild the caller's arguments on the host.
pub fn restore_defaults(
    flags: AddrIrkFlags,
    addr: Option<BtAddrLe>,
    irk: Option<Irk>,
) -> (Option<BtAddrLe>, Option<Irk>) {
    let addr = if flags.returns_addr() {
        Some(BtAddrLe::ANY)
    } else {
        addr.filter(|_| flags.sends_addr())
    };
    let irk = if flags.returns_irk() { Some(IRK_ANY) } else { irk.filter(|_| flags.sends_irk()) };
    (addr, irk)
}

/// Values the host sends back after executing.
///
/// Fields the caller provided come back unchanged, so only generated ones
/// are returned.
pub fn response_fields(
    flags: AddrIrkFlags,
    addr: Option<BtAddrLe>,
    irk: Option<Irk>,
) -> (Option<BtAddrLe>, Option<Irk>) {
    (addr.filter(|_| flags.returns_addr()), irk.filter(|_| flags.returns_irk()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> BtAddrLe {
        BtAddrLe::random_static([9, 8, 7, 6, 5, 4])
    }

    #[test]
    fn flags_describe_presence_and_defaults() {
        assert_eq!(apply_addr_irk_flags(None, None), AddrIrkFlags::empty());
        assert_eq!(
            apply_addr_irk_flags(Some(&BtAddrLe::ANY), None),
            AddrIrkFlags::ADDR | AddrIrkFlags::ADDR_DEFAULT
        );
        assert_eq!(
            apply_addr_irk_flags(Some(&addr()), Some(&IRK_ANY)),
            AddrIrkFlags::ADDR | AddrIrkFlags::IRK | AddrIrkFlags::IRK_DEFAULT
        );
    }

    #[test]
    fn defaults_never_travel() {
        let flags = apply_addr_irk_flags(Some(&BtAddrLe::ANY), Some(&[7; 16]));
        let (wire_addr, wire_irk) = strip_defaults(flags, Some(&BtAddrLe::ANY), Some(&[7; 16]));
        assert_eq!(wire_addr, None);
        assert_eq!(wire_irk, Some([7; 16]));
    }

    #[test]
    fn host_sees_what_the_caller_passed() {
        let cases: [(Option<BtAddrLe>, Option<Irk>); 5] = [
            (None, None),
            (Some(BtAddrLe::ANY), None),
            (Some(addr()), Some(IRK_ANY)),
            (None, Some([3; 16])),
            (Some(BtAddrLe::ANY), Some(IRK_ANY)),
        ];
        for (addr, irk) in cases {
            let flags = apply_addr_irk_flags(addr.as_ref(), irk.as_ref());
            assert!(flags.is_consistent());
            let (wire_addr, wire_irk) = strip_defaults(flags, addr.as_ref(), irk.as_ref());
            assert_eq!(restore_defaults(flags, wire_addr, wire_irk), (addr, irk));
        }
    }

    #[test]
    fn only_generated_fields_come_back() {
        let flags = apply_addr_irk_flags(Some(&BtAddrLe::ANY), Some(&[5; 16]));
        let (addr_out, irk_out) = response_fields(flags, Some(addr()), Some([5; 16]));
        assert_eq!(addr_out, Some(addr()));
        assert_eq!(irk_out, None);
    }

    #[test]
    fn default_without_presence_is_inconsistent() {
        assert!(!AddrIrkFlags::ADDR_DEFAULT.is_consistent());
        assert!(!(AddrIrkFlags::ADDR | AddrIrkFlags::IRK_DEFAULT).is_consistent());
        assert!(AddrIrkFlags::all().is_consistent());
    }
}
