//! Policy evaluation for inbound connection attempts.
//!
//! The login front-end calls [`Evaluator::evaluate`] once per connection,
//! after it has verified a primary credential and before it decides whether
//! to prompt for a second factor. The evaluator computes the decision from
//! the loaded [`Policy`], emits exactly one matching audit record, and
//! returns the decision. It performs no I/O of its own and completes
//! synchronously; timeouts and prompting belong to the caller.

use chrono::{DateTime, Utc};

use crate::audit::{AuditRecord, AuditSink};
use crate::policy::{Decision, Policy};

/// Verified origin of one connection attempt.
///
/// The source address is the network-layer peer address as reported by the
/// transport (the `PAM_RHOST` analogue), never a client-claimed value. It is
/// passed explicitly rather than read from ambient state, and may be absent
/// or malformed; both are normal inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Transport-reported peer address, if any
    pub source_address: Option<String>,
    /// Decision time
    pub timestamp: DateTime<Utc>,
}

impl ConnectionContext {
    /// Context for a connection arriving now.
    pub fn new(source_address: Option<&str>) -> Self {
        Self::at(source_address, Utc::now())
    }

    /// Context with an explicit decision time.
    pub fn at(source_address: Option<&str>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source_address: source_address.map(String::from),
            timestamp,
        }
    }
}

/// Maps connection contexts to second-factor decisions under a fixed policy.
///
/// Owning the policy makes "evaluated without a loaded policy" unrepresentable.
/// `evaluate` takes `&self`, so one evaluator serves any number of concurrent
/// connection attempts without locking.
pub struct Evaluator {
    policy: Policy,
    audit: AuditSink,
}

impl Evaluator {
    /// Build an evaluator for a loaded policy and a running audit sink.
    pub fn new(policy: Policy, audit: AuditSink) -> Self {
        Self { policy, audit }
    }

    /// The active policy.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The audit sink, for counter inspection.
    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    /// Decide whether this connection needs a second factor.
    ///
    /// Emits one audit record per invocation, consistent with the returned
    /// decision. Audit trouble is counted and reported operationally but
    /// never changes the decision.
    pub fn evaluate(&self, context: &ConnectionContext) -> Decision {
        let decision = self.policy.decide(context.source_address.as_deref());
        self.audit.record(AuditRecord::for_decision(&decision, context));
        decision
    }
}
