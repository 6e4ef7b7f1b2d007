//! Renewal policy
//!
//! Chooses between leaving the endpoint alone, delegating from scratch and
//! renewing, based on how long the currently delegated proxy still lives.

use std::fmt;

/// Outcome of the renewal policy for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationDecision {
    /// Existing delegation already covers the requested lifetime
    NoAction,
    /// Nothing delegated yet under the identifier
    NewDelegation,
    /// Existing delegation expires too early
    Renewal,
}

impl fmt::Display for DelegationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DelegationDecision::NoAction => "no action",
            DelegationDecision::NewDelegation => "new delegation",
            DelegationDecision::Renewal => "renewal",
        };
        f.write_str(s)
    }
}

/// Decide what an attempt must do
///
/// `remaining` is the number of seconds left on the delegated proxy, or
/// `None` when the endpoint reported none. Renewal only triggers when the
/// remaining time is strictly shorter than `requested_lifetime`.
pub fn decide(remaining: Option<i64>, requested_lifetime: i64) -> DelegationDecision {
    match remaining {
        None => DelegationDecision::NewDelegation,
        Some(left) if left < requested_lifetime => DelegationDecision::Renewal,
        Some(_) => DelegationDecision::NoAction,
    }
}
