//! Operation identities.
//!
//! A remote operation is addressed by its group and a numeric id. Commands
//! and events use separate id spaces inside a group, so the routing key
//! carries the kind as well.

use std::{fmt, num::NonZeroU32};

/// A named group of operations sharing one id space per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Group {
    id: u8,
    name: &'static str,
}

impl Group {
    /// Declare a group.
    pub const fn new(id: u8, name: &'static str) -> Self {
        Self { id, name }
    }

    /// Numeric group id used for routing.
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Human readable group name, used in logs.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Whether an operation expects a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    /// Request/response: exactly one response is expected
    Command,
    /// One-way: no response is ever sent
    Event,
}

/// Full identity of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId {
    /// Group the operation belongs to
    pub group: Group,
    /// Operation id, unique per group and kind
    pub op: u8,
    /// Command or event
    pub kind: OpKind,
}

impl OperationId {
    /// Declare a command.
    pub const fn command(group: Group, op: u8) -> Self {
        Self { group, op, kind: OpKind::Command }
    }

    /// Declare an event.
    pub const fn event(group: Group, op: u8) -> Self {
        Self { group, op, kind: OpKind::Event }
    }

    /// True for commands.
    pub const fn expects_response(&self) -> bool {
        matches!(self.kind, OpKind::Command)
    }

    /// Key used by dispatch tables.
    pub const fn route_key(&self) -> RouteKey {
        RouteKey { group: self.group.id, kind: self.kind, op: self.op }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            OpKind::Command => "cmd",
            OpKind::Event => "evt",
        };
        write!(f, "{}/{kind}#{:#04x}", self.group.name, self.op)
    }
}

/// Numeric routing key: `(group id, kind, op id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    /// Group id
    pub group: u8,
    /// Command or event
    pub kind: OpKind,
    /// Operation id
    pub op: u8,
}

/// Opaque reference to a function living on the other side of the link.
///
/// Zero is reserved on the wire; an absent callback is encoded as CBOR null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(NonZeroU32);

impl CallbackHandle {
    /// Wrap a raw handle, rejecting the reserved zero value.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Raw wire value.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRP: Group = Group::new(3, "test_grp");

    #[test]
    fn commands_and_events_do_not_collide() {
        let cmd = OperationId::command(GRP, 1);
        let evt = OperationId::event(GRP, 1);
        assert_ne!(cmd.route_key(), evt.route_key());
        assert!(cmd.expects_response());
        assert!(!evt.expects_response());
    }

    #[test]
    fn display_names_group_and_kind() {
        assert_eq!(OperationId::command(GRP, 0x0a).to_string(), "test_grp/cmd#0x0a");
        assert_eq!(OperationId::event(GRP, 2).to_string(), "test_grp/evt#0x02");
    }

    #[test]
    fn callback_handle_rejects_zero() {
        assert!(CallbackHandle::new(0).is_none());
        assert_eq!(CallbackHandle::new(7).map(CallbackHandle::get), Some(7));
    }
}
