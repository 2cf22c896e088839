//! Deterministic fault injection.
//!
//! A [`FaultPlan`] gives the probability of each fault; a [`FaultInjector`]
//! applies it to messages using a ChaCha RNG seeded by the test, so a
//! failing run can be replayed from its seed.

use bytes::{Bytes, BytesMut};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// One kind of damage applied to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Cut the message at a random point
    Truncate,
    /// Append one to four random bytes
    AppendTrailing,
    /// Flip bits in one random byte
    CorruptByte,
    /// Lose the response entirely
    DropResponse,
}

/// Per-message fault probabilities, each in `[0.0, 1.0]`.
///
/// At most one of the request faults is applied per message, checked in
/// the order truncate, trailing, corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaultPlan {
    /// Probability of truncating a message
    pub truncate: f64,
    /// Probability of appending trailing bytes
    pub trailing: f64,
    /// Probability of corrupting a byte
    pub corrupt: f64,
    /// Probability of dropping a command's response
    pub drop_response: f64,
}

impl FaultPlan {
    /// No faults.
    pub fn none() -> Self {
        Self::default()
    }

    /// Apply only `fault`, with probability `rate`.
    pub fn only(fault: Fault, rate: f64) -> Self {
        let mut plan = Self::none();
        match fault {
            Fault::Truncate => plan.truncate = rate,
            Fault::AppendTrailing => plan.trailing = rate,
            Fault::CorruptByte => plan.corrupt = rate,
            Fault::DropResponse => plan.drop_response = rate,
        }
        plan
    }

    fn clamp(rate: f64) -> f64 {
        if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
    }
}

/// Applies a [`FaultPlan`] with a seeded RNG.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    plan: FaultPlan,
    rng: ChaCha8Rng,
    injected: Vec<Fault>,
}

impl FaultInjector {
    /// Create an injector; the same seed always produces the same faults.
    pub fn new(plan: FaultPlan, seed: u64) -> Self {
        Self { plan, rng: ChaCha8Rng::seed_from_u64(seed), injected: Vec::new() }
    }

    /// Maybe damage a message on its way out.
    pub fn mangle(&mut self, message: Bytes) -> Bytes {
        if self.roll(self.plan.truncate) && !message.is_empty() {
            let keep = self.rng.gen_range(0..message.len());
            self.record(Fault::Truncate, message.len(), keep);
            return message.slice(..keep);
        }
        if self.roll(self.plan.trailing) {
            let extra = self.rng.gen_range(1..=4);
            let mut out = BytesMut::from(&message[..]);
            for _ in 0..extra {
                out.extend_from_slice(&[self.rng.r#gen::<u8>()]);
            }
            self.record(Fault::AppendTrailing, message.len(), out.len());
            return out.freeze();
        }
        if self.roll(self.plan.corrupt) && !message.is_empty() {
            let at = self.rng.gen_range(0..message.len());
            let mask = self.rng.gen_range(1..=u8::MAX);
            let mut out = BytesMut::from(&message[..]);
            out[at] ^= mask;
            self.record(Fault::CorruptByte, message.len(), out.len());
            return out.freeze();
        }
        message
    }

    /// Decide whether a response is lost.
    pub fn drop_response(&mut self) -> bool {
        let dropped = self.roll(self.plan.drop_response);
        if dropped {
            self.injected.push(Fault::DropResponse);
            tracing::debug!("fault injected: response dropped");
        }
        dropped
    }

    /// Every fault applied so far, in order.
    pub fn injected(&self) -> &[Fault] {
        &self.injected
    }

    fn roll(&mut self, rate: f64) -> bool {
        let rate = FaultPlan::clamp(rate);
        rate > 0.0 && self.rng.gen_bool(rate)
    }

    fn record(&mut self, fault: Fault, before: usize, after: usize) {
        tracing::debug!(?fault, before, after, "fault injected");
        self.injected.push(fault);
    }
}
