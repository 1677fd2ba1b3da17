//! Trust policy for second-factor gating.
//!
//! A policy is an ordered list of trusted network ranges loaded once at
//! startup and read-only thereafter. Everything outside those ranges,
//! including connections with no usable source address, requires a second
//! factor.

pub mod config;
pub mod rules;

pub use config::{PolicyError, PolicyFile, TrustRuleEntry};
pub use rules::{Decision, DecisionReason, Policy, TrustRule};
