//! Trust rules and the pure second-factor decision function.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::Serialize;

/// A trusted network range, exempt from the second-factor requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustRule {
    /// CIDR block considered trusted
    pub network: IpNetwork,
    /// Human-readable name for audit output
    pub label: String,
}

impl TrustRule {
    pub fn new(network: IpNetwork, label: impl Into<String>) -> Self {
        Self {
            network,
            label: label.into(),
        }
    }
}

/// Enumerated cause of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    /// Source address fell inside a configured trusted network
    MatchedTrustedNetwork,
    /// Transport reported no source address
    NoSourceAddress,
    /// Reported source address did not parse as an IP address
    MalformedSourceAddress,
    /// Valid address, but no trust rule covers it
    NoRuleMatch,
}

impl DecisionReason {
    /// Stable reason code for audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchedTrustedNetwork => "matched-trusted-network",
            Self::NoSourceAddress => "no-source-address",
            Self::MalformedSourceAddress => "malformed-source-address",
            Self::NoRuleMatch => "no-rule-match",
        }
    }
}

/// Outcome of evaluating one connection against the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the front-end must demand a second factor
    pub second_factor_required: bool,
    /// The rule that produced the outcome, if any
    pub matched_rule: Option<TrustRule>,
    /// Why the outcome was reached
    pub reason: DecisionReason,
}

impl Decision {
    fn require(reason: DecisionReason) -> Self {
        Self {
            second_factor_required: true,
            matched_rule: None,
            reason,
        }
    }

    fn exempt(rule: &TrustRule) -> Self {
        Self {
            second_factor_required: false,
            matched_rule: Some(rule.clone()),
            reason: DecisionReason::MatchedTrustedNetwork,
        }
    }
}

/// The active trust policy: an ordered set of trusted networks.
///
/// The fail-secure default is structural, not configurable: every path out of
/// [`Policy::decide`] that is not an explicit trusted match requires the
/// second factor. A policy source that tries to turn the default off is
/// rejected at load time (see [`super::config`]).
///
/// Read-only after construction; safe to share by reference across any number
/// of concurrent evaluations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    rules: Vec<TrustRule>,
}

impl Policy {
    /// Build a policy from an ordered rule list.
    ///
    /// Order matters only for audit-label selection on overlapping ranges:
    /// the first rule containing an address wins.
    pub fn new(rules: Vec<TrustRule>) -> Self {
        Self { rules }
    }

    /// The configured rules, in evaluation order.
    pub fn rules(&self) -> &[TrustRule] {
        &self.rules
    }

    /// Decide whether a connection from `source` needs a second factor.
    ///
    /// Pure and deterministic: no I/O, no shared state. Absent or malformed
    /// input is a normal input class handled by requiring the second factor,
    /// never an error.
    pub fn decide(&self, source: Option<&str>) -> Decision {
        let raw = match source {
            Some(s) if !s.trim().is_empty() => s.trim(),
            _ => return Decision::require(DecisionReason::NoSourceAddress),
        };

        let addr: IpAddr = match raw.parse() {
            Ok(addr) => addr,
            Err(_) => return Decision::require(DecisionReason::MalformedSourceAddress),
        };

        // First match wins on overlapping ranges.
        match self.rules.iter().find(|r| r.network.contains(addr)) {
            Some(rule) => Decision::exempt(rule),
            None => Decision::require(DecisionReason::NoRuleMatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn rule(network: &str, label: &str) -> TrustRule {
        TrustRule::new(IpNetwork::from_str(network).unwrap(), label)
    }

    fn home_policy() -> Policy {
        Policy::new(vec![rule("192.168.1.0/24", "home-lan")])
    }

    #[test]
    fn test_trusted_address_is_exempt() {
        let decision = home_policy().decide(Some("192.168.1.50"));

        assert!(!decision.second_factor_required);
        assert_eq!(decision.reason, DecisionReason::MatchedTrustedNetwork);
        assert_eq!(decision.matched_rule.unwrap().label, "home-lan");
    }

    #[test]
    fn test_untrusted_address_requires_second_factor() {
        let decision = home_policy().decide(Some("203.0.113.42"));

        assert!(decision.second_factor_required);
        assert_eq!(decision.reason, DecisionReason::NoRuleMatch);
        assert!(decision.matched_rule.is_none());
    }

    #[test]
    fn test_absent_source_requires_second_factor() {
        let decision = home_policy().decide(None);

        assert!(decision.second_factor_required);
        assert_eq!(decision.reason, DecisionReason::NoSourceAddress);
    }

    #[test]
    fn test_empty_source_requires_second_factor() {
        let decision = home_policy().decide(Some(""));

        assert!(decision.second_factor_required);
        assert_eq!(decision.reason, DecisionReason::NoSourceAddress);
    }

    #[test]
    fn test_malformed_source_requires_second_factor() {
        for garbage in ["not-an-ip", "192.168.1", "192.168.1.999", "fe80::g"] {
            let decision = home_policy().decide(Some(garbage));

            assert!(decision.second_factor_required, "{garbage} must not bypass");
            assert_eq!(decision.reason, DecisionReason::MalformedSourceAddress);
        }
    }

    #[test]
    fn test_mask_boundary_is_respected() {
        // A naive string-prefix check on "192.168.1." would also accept
        // 192.168.10.5; CIDR containment must not.
        let decision = home_policy().decide(Some("192.168.10.5"));

        assert!(decision.second_factor_required);
        assert_eq!(decision.reason, DecisionReason::NoRuleMatch);
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        let policy = Policy::new(vec![rule("10.0.0.0/8", "a"), rule("10.0.0.0/16", "b")]);

        let decision = policy.decide(Some("10.0.5.5"));
        assert!(!decision.second_factor_required);
        assert_eq!(decision.matched_rule.unwrap().label, "a");

        // Listing order, not specificity, picks the label.
        let policy = Policy::new(vec![rule("10.0.0.0/16", "b"), rule("10.0.0.0/8", "a")]);
        let decision = policy.decide(Some("10.0.5.5"));
        assert_eq!(decision.matched_rule.unwrap().label, "b");
    }

    #[test]
    fn test_ipv6_rules() {
        let policy = Policy::new(vec![rule("fd00::/8", "site-vpn")]);

        assert!(!policy.decide(Some("fd12:3456::1")).second_factor_required);
        assert!(policy.decide(Some("2001:db8::1")).second_factor_required);
        // v4 address never matches a v6 rule
        assert!(policy.decide(Some("10.0.0.1")).second_factor_required);
    }

    #[test]
    fn test_empty_policy_requires_everywhere() {
        let policy = Policy::new(Vec::new());

        let decision = policy.decide(Some("192.168.1.50"));
        assert!(decision.second_factor_required);
        assert_eq!(decision.reason, DecisionReason::NoRuleMatch);
    }

    #[test]
    fn test_decide_is_idempotent() {
        let policy = home_policy();

        let first = policy.decide(Some("192.168.1.50"));
        for _ in 0..10 {
            assert_eq!(policy.decide(Some("192.168.1.50")), first);
        }
    }

    #[test]
    fn test_whitespace_around_address_is_tolerated() {
        let decision = home_policy().decide(Some(" 192.168.1.50 "));
        assert!(!decision.second_factor_required);
    }

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(
            DecisionReason::MatchedTrustedNetwork.as_str(),
            "matched-trusted-network"
        );
        assert_eq!(DecisionReason::NoSourceAddress.as_str(), "no-source-address");
        assert_eq!(
            DecisionReason::MalformedSourceAddress.as_str(),
            "malformed-source-address"
        );
        assert_eq!(DecisionReason::NoRuleMatch.as_str(), "no-rule-match");
    }
}
