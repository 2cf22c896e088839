//! Callbacks across the link.
//!
//! A function pointer cannot cross the wire. The side that owns the function
//! registers a trampoline in its [`CallbackRegistry`] and sends the returned
//! [`CallbackHandle`] instead. The other side wraps the handle in a
//! [`RemoteCallback`]; invoking it sends an event carrying the handle back,
//! and the owner's event handler looks the trampoline up and runs it.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use stubwire_proto::CallbackHandle;

use crate::{
    config::CallbackPolicy,
    error::{CallbackError, RpcError},
    stub::{Caller, Request},
};

// Each trampoline has its own lock so it can run without the registry lock.
type Trampoline<A> = Arc<Mutex<dyn FnMut(A) + Send>>;

/// Local trampolines addressed by opaque handles.
pub struct CallbackRegistry<A> {
    next: AtomicU32,
    policy: CallbackPolicy,
    slots: Mutex<HashMap<CallbackHandle, Trampoline<A>>>,
}

impl<A> std::fmt::Debug for CallbackRegistry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("policy", &self.policy)
            .field("registered", &self.len())
            .finish()
    }
}

impl<A> CallbackRegistry<A> {
    /// An empty registry with the given invocation policy.
    pub fn new(policy: CallbackPolicy) -> Self {
        Self { next: AtomicU32::new(1), policy, slots: Mutex::new(HashMap::new()) }
    }

    /// Invocation policy.
    pub fn policy(&self) -> CallbackPolicy {
        self.policy
    }

    /// Store `callback` and return the handle to send in its place.
    pub fn register(&self, callback: impl FnMut(A) + Send + 'static) -> CallbackHandle {
        let handle = loop {
            // zero is reserved; skip it when the counter wraps
            if let Some(handle) = CallbackHandle::new(self.next.fetch_add(1, Ordering::Relaxed)) {
                break handle;
            }
        };
        let trampoline: Trampoline<A> = Arc::new(Mutex::new(callback));
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).insert(handle, trampoline);
        tracing::debug!(%handle, "callback registered");
        handle
    }

    /// Drop a trampoline without running it.
    ///
    /// Returns `false` if the handle was not registered.
    pub fn unregister(&self, handle: CallbackHandle) -> bool {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).remove(&handle).is_some()
    }

    /// Run the trampoline for `handle`.
    ///
    /// The callback runs without the registry lock held, so it may register
    /// or unregister callbacks, including its own handle. Under
    /// [`CallbackPolicy::Once`] it is removed first. Under
    /// [`CallbackPolicy::Repeated`] it stays registered until
    /// [`CallbackRegistry::unregister`]; concurrent invocations of one handle
    /// run one after the other, and a callback must not invoke its own handle.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError::UnknownHandle`] if nothing is registered
    /// under `handle`.
    pub fn invoke(&self, handle: CallbackHandle, arg: A) -> Result<(), CallbackError> {
        let found = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            match self.policy {
                CallbackPolicy::Once => slots.remove(&handle),
                CallbackPolicy::Repeated => slots.get(&handle).map(Arc::clone),
            }
        };
        let Some(callback) = found else {
            tracing::warn!(%handle, "invocation of unknown callback");
            return Err(CallbackError::UnknownHandle(handle));
        };
        let mut guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
        (&mut *guard)(arg);
        Ok(())
    }

    /// Number of registered trampolines.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A callback owned by the peer, held as its handle.
#[derive(Debug, Clone)]
pub struct RemoteCallback {
    handle: CallbackHandle,
    caller: Caller,
}

impl RemoteCallback {
    /// Bind a handle received from the peer to the link back to it.
    pub fn new(handle: CallbackHandle, caller: Caller) -> Self {
        Self { handle, caller }
    }

    /// Handle as received.
    pub fn handle(&self) -> CallbackHandle {
        self.handle
    }

    /// Fire the callback: send the event built from the handle.
    ///
    /// # Errors
    ///
    /// Returns whatever [`Caller::notify`] returns.
    pub fn invoke<R: Request>(
        &self,
        event: impl FnOnce(CallbackHandle) -> R,
    ) -> Result<(), RpcError> {
        self.caller.notify(&event(self.handle))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicI32, AtomicUsize},
    };

    use super::*;

    #[test]
    fn once_policy_consumes_the_trampoline() {
        let registry = CallbackRegistry::new(CallbackPolicy::Once);
        let seen = Arc::new(AtomicI32::new(0));
        let sink = Arc::clone(&seen);
        let handle = registry.register(move |err: i32| sink.store(err, Ordering::SeqCst));

        registry.invoke(handle, -5).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), -5);
        assert_eq!(registry.invoke(handle, 1), Err(CallbackError::UnknownHandle(handle)));
        assert!(registry.is_empty());
    }

    #[test]
    fn repeated_policy_keeps_the_trampoline() {
        let registry = CallbackRegistry::new(CallbackPolicy::Repeated);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = registry.register(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            registry.invoke(handle, ()).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(registry.unregister(handle));
        assert!(!registry.unregister(handle));
    }

    #[test]
    fn repeated_callback_can_unregister_itself() {
        let registry = Arc::new(CallbackRegistry::new(CallbackPolicy::Repeated));
        let own = Arc::new(Mutex::new(None));
        let removed = Arc::new(Mutex::new(None));

        let (reg, slot, result) = (Arc::clone(&registry), Arc::clone(&own), Arc::clone(&removed));
        let handle = registry.register(move |()| {
            if let Some(handle) = *slot.lock().unwrap() {
                *result.lock().unwrap() = Some(reg.unregister(handle));
            }
        });
        *own.lock().unwrap() = Some(handle);

        registry.invoke(handle, ()).unwrap();
        assert_eq!(*removed.lock().unwrap(), Some(true));
        assert!(registry.is_empty());
        assert_eq!(registry.invoke(handle, ()), Err(CallbackError::UnknownHandle(handle)));
        assert!(!registry.unregister(handle));
    }

    #[test]
    fn unregister_from_another_thread_while_running_sticks() {
        let registry = Arc::new(CallbackRegistry::new(CallbackPolicy::Repeated));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let handle = registry.register(move |()| {
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
        });

        let runner = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.invoke(handle, ()))
        };
        entered_rx.recv().unwrap();
        assert!(registry.unregister(handle));
        release_tx.send(()).unwrap();

        runner.join().unwrap().unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.invoke(handle, ()), Err(CallbackError::UnknownHandle(handle)));
    }

    #[test]
    fn handles_are_distinct_and_never_zero() {
        let registry = CallbackRegistry::<()>::new(CallbackPolicy::Once);
        let a = registry.register(|()| {});
        let b = registry.register(|()| {});
        assert_ne!(a, b);
        assert_ne!(a.get(), 0);
        assert_eq!(registry.len(), 2);
    }
}
