//! Context-aware second-factor gating for login front-ends.
//!
//! `netgate` decides, per inbound connection, whether a second authentication
//! factor must be demanded, based on the verified network origin of the
//! connection. The workflow is:
//! 1. The front-end (SSH daemon / PAM stack) verifies a primary credential
//! 2. It builds a [`ConnectionContext`] from the transport-reported peer
//!    address and calls [`Evaluator::evaluate`]
//! 3. The evaluator matches the address against the configured trusted
//!    networks (first match wins) and returns a [`Decision`]
//! 4. One audit record per decision lands in syslog and the audit file
//!
//! Every path that is not an explicit trusted-network match — absent address,
//! unparseable address, no matching rule — requires the second factor. That
//! fail-secure default is structural: a policy that tries to disable it is
//! rejected at load time.
//!
//! The crate never performs network I/O, never verifies credentials, and
//! never raises privileges. Prompting for and verifying the second factor
//! itself is the caller's concern.
//!
//! ## Environment Variables
//! - `NETGATE_POLICY_FILE` (optional): path to the policy YAML
//! - `NETGATE_POLICY_YAML` (optional): inline policy YAML document
//! - `NETGATE_AUDIT_LOG` (optional): audit file path, defaults to
//!   `/var/log/netgate-audit.log`
//!
//! ## Example
//! ```no_run
//! use netgate::{ConnectionContext, Evaluator};
//!
//! let evaluator = Evaluator::from_env()?;
//! let decision = evaluator.evaluate(&ConnectionContext::new(Some("192.168.1.50")));
//! if decision.second_factor_required {
//!     // prompt for the second factor before letting the login proceed
//! }
//! # Ok::<(), netgate::SetupError>(())
//! ```

#![deny(unsafe_code)]

pub mod audit;
pub mod evaluator;
pub mod policy;

pub use audit::{AuditConfig, AuditOutcome, AuditRecord, AuditSink, AuditStats};
pub use evaluator::{ConnectionContext, Evaluator};
pub use policy::{Decision, DecisionReason, Policy, PolicyError, PolicyFile, TrustRule};

use thiserror::Error;

/// Startup failures. Only these are fatal; once an [`Evaluator`] exists,
/// every connection attempt gets a well-formed [`Decision`].
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Policy load failed: {0}")]
    Policy(#[from] PolicyError),

    #[error("Audit sink start failed: {0}")]
    Audit(#[from] std::io::Error),
}

impl Evaluator {
    /// Build an evaluator entirely from environment configuration.
    ///
    /// Refuses to start on a malformed or insecure policy rather than run
    /// with a partially loaded trust set.
    pub fn from_env() -> Result<Self, SetupError> {
        let policy = Policy::from_env()?;
        let audit = AuditSink::from_env()?;
        Ok(Self::new(policy, audit))
    }
}
