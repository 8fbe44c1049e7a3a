//! the arbiter of the register slave
//!
//! three requesters share the bank: the bus read channel, the bus write channel and the
//! internal write channel of the FIR engine. the arbiter grants one of them and keeps the
//! grant until the holder reports it is done, so a burst is never split.

use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Requester {
    Read,
    Write,
    Internal,
}

impl Requester {
    pub const ALL: [Requester; 3] = [Requester::Read, Requester::Write, Requester::Internal];

    pub fn index(self) -> usize {
        match self {
            Requester::Read => 0,
            Requester::Write => 1,
            Requester::Internal => 2,
        }
    }
}

/// # Description
/// * `RoundRobin`: the search starts right after the last granted requester, the configured
///   order only breaks ties. every requester waits for at most two other grants
/// * `Priority`: the first pending requester in the configured order wins, a requester that
///   never goes quiet starves the ones behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterPolicy {
    Priority,
    RoundRobin,
}

/// # Description
/// * `Idle`: nobody holds the bank, the next pick re-evaluates the request mask
/// * `HeldBy`: the requester keeps the bank until `release`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbState {
    Idle,
    HeldBy(Requester),
}

/// the pending flags sampled in one tick, indexed by `Requester::index`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestMask([bool; 3]);

impl RequestMask {
    pub fn new(read: bool, write: bool, internal: bool) -> Self {
        RequestMask([read, write, internal])
    }
    pub fn is_pending(&self, requester: Requester) -> bool {
        self.0[requester.index()]
    }
    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|&p| p)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrantCounts {
    pub read: u64,
    pub write: u64,
    pub internal: u64,
}

#[derive(Debug)]
pub struct Arbiter {
    policy: ArbiterPolicy,
    order: Vec<Requester>,
    state: ArbState,
    last_grant: Option<Requester>,
    grants: GrantCounts,
}

impl Arbiter {
    /// `order` must hold every requester once, see `AcceleratorSettings::validate`
    pub fn new(policy: ArbiterPolicy, order: Vec<Requester>) -> Arbiter {
        Arbiter {
            policy,
            order,
            state: ArbState::Idle,
            last_grant: None,
            grants: GrantCounts::default(),
        }
    }

    /// # Description
    /// pick the requester that may touch the bank in this tick
    /// - when the bank is held, the holder is returned whatever the mask says
    /// - when idle and nobody is pending, returns None and stays idle
    ///
    /// # Example
    /// ```
    /// use fir_accel::accelerator::arbiter::*;
    /// let mut arb = Arbiter::new(ArbiterPolicy::Priority, Requester::ALL.to_vec());
    /// let all = RequestMask::new(true, true, true);
    /// assert_eq!(arb.pick(all), Some(Requester::Read));
    /// // read still holds the grant, even with no flag set
    /// assert_eq!(arb.pick(RequestMask::default()), Some(Requester::Read));
    /// arb.release(Requester::Read);
    /// assert_eq!(arb.pick(RequestMask::new(false, true, true)), Some(Requester::Write));
    /// ```
    pub fn pick(&mut self, mask: RequestMask) -> Option<Requester> {
        if let ArbState::HeldBy(holder) = self.state {
            return Some(holder);
        }
        let start = match (self.policy, self.last_grant) {
            (ArbiterPolicy::RoundRobin, Some(last)) => self
                .order
                .iter()
                .position(|&r| r == last)
                .map_or(0, |p| p + 1),
            _ => 0,
        };
        let n = self.order.len();
        let winner = (0..n)
            .map(|i| self.order[(start + i) % n])
            .find(|&r| mask.is_pending(r))?;

        debug!("arbiter grants {:?}, mask {:?}", winner, mask);
        self.state = ArbState::HeldBy(winner);
        self.last_grant = Some(winner);
        match winner {
            Requester::Read => self.grants.read += 1,
            Requester::Write => self.grants.write += 1,
            Requester::Internal => self.grants.internal += 1,
        }
        Some(winner)
    }

    /// the holder finished its burst or its single write
    pub fn release(&mut self, requester: Requester) {
        assert_eq!(
            self.state,
            ArbState::HeldBy(requester),
            "release by a requester that does not hold the bank"
        );
        self.state = ArbState::Idle;
    }

    pub fn state(&self) -> ArbState {
        self.state
    }

    pub fn holder(&self) -> Option<Requester> {
        match self.state {
            ArbState::HeldBy(r) => Some(r),
            ArbState::Idle => None,
        }
    }

    pub fn needs_update(&self) -> bool {
        self.state == ArbState::Idle
    }

    pub fn grants(&self) -> &GrantCounts {
        &self.grants
    }
}
