//! Decision policies.
//!
//! A policy is a pure `(phase, phase_success) -> should_continue`
//! predicate the engine consults exactly once per phase, after the
//! phase barrier.

/// Continue only while phases succeed.
pub fn default_policy(_phase: i64, phase_success: bool) -> bool {
    phase_success
}

/// Keep going despite failures; nothing is rolled back.
pub fn non_critical_policy(_phase: i64, _phase_success: bool) -> bool {
    true
}

/// Permit failures only after `threshold`: a failed phase at or below
/// it stops the rollout, later failures are tolerated.
pub fn threshold_policy(threshold: i64) -> impl Fn(i64, bool) -> bool {
    move |phase, phase_success| phase_success || phase > threshold
}
