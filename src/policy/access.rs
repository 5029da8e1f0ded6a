//! VPN / region access enforcement.
//!
//! This module decides whether the page may render based on:
//! - VPN detection (blocked when connected through a VPN)
//! - Region restrictions (blocked in restricted regions)
//! - The failure policy when the check itself fails

use crate::client::http::VpnChecker;
use crate::meter::events::{self, BlockReason, VpnCheckResult};
use crate::observe::{ErrorReport, ErrorReporter, ReportLevel};
use crate::policy::gate::AnalyticsGate;
use crate::protocol::models::{ServiceId, VpnStatus};
use crate::ConsentError;
use once_cell::unsync::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};

/// What to do when the VPN check cannot be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Let the visitor in.
    #[default]
    FailOpen,
    /// Show the blocked page.
    FailClosed,
}

/// Outcome of the access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether the page may render.
    pub allowed: bool,
    /// Tracked result.
    pub result: VpnCheckResult,
    /// Why access was refused, when it was.
    pub block_reason: Option<BlockReason>,
    /// The status the service returned, if the check succeeded.
    pub status: Option<VpnStatus>,
}

impl AccessDecision {
    fn blocked(result: VpnCheckResult, reason: BlockReason, status: Option<VpnStatus>) -> Self {
        Self {
            allowed: false,
            result,
            block_reason: Some(reason),
            status,
        }
    }

    /// Country code reported by the service.
    pub fn country_code(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.country_code.as_deref())
    }
}

/// Decide access from a check result.
///
/// A VPN connection takes precedence over a restricted region.
pub fn decide_access(
    checked: &Result<VpnStatus, ConsentError>,
    policy: FailurePolicy,
) -> AccessDecision {
    match checked {
        Ok(status) if status.is_connected_to_vpn => AccessDecision::blocked(
            VpnCheckResult::VpnBlocked,
            BlockReason::VpnDetected,
            Some(status.clone()),
        ),
        Ok(status) if status.is_restricted_region => AccessDecision::blocked(
            VpnCheckResult::RegionBlocked,
            BlockReason::RestrictedRegion,
            Some(status.clone()),
        ),
        Ok(status) => AccessDecision {
            allowed: true,
            result: VpnCheckResult::Allowed,
            block_reason: None,
            status: Some(status.clone()),
        },
        Err(_) => match policy {
            FailurePolicy::FailOpen => AccessDecision {
                allowed: true,
                result: VpnCheckResult::Error,
                block_reason: None,
                status: None,
            },
            FailurePolicy::FailClosed => {
                AccessDecision::blocked(VpnCheckResult::Error, BlockReason::NetworkError, None)
            }
        },
    }
}

/// Runs the VPN check once per page load and tracks its outcome.
pub struct VpnGuard {
    checker: Box<dyn VpnChecker>,
    reporter: Arc<dyn ErrorReporter>,
    policy: FailurePolicy,
    decision: OnceCell<AccessDecision>,
}

impl VpnGuard {
    /// Create a guard.
    pub fn new(
        checker: Box<dyn VpnChecker>,
        reporter: Arc<dyn ErrorReporter>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            checker,
            reporter,
            policy,
            decision: OnceCell::new(),
        }
    }

    /// The failure policy in force.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// The decision, if the check already ran.
    pub fn decision(&self) -> Option<&AccessDecision> {
        self.decision.get()
    }

    /// Run the check, or return the earlier decision.
    ///
    /// Failures go to the error reporter; the outcome events are captured
    /// through PostHog and dropped by the gate when it is not running.
    pub fn check(&self, gate: &mut AnalyticsGate) -> &AccessDecision {
        self.decision.get_or_init(|| {
            let checked = self.checker.check();
            if let Err(e) = &checked {
                warn!(error = %e, policy = ?self.policy, "vpn check failed");
                self.reporter.report(
                    &ErrorReport::new(e.to_string(), ReportLevel::Warning)
                        .tag("type", "auth_error")
                        .tag("check", "vpn"),
                );
            }

            let decision = decide_access(&checked, self.policy);
            info!(allowed = decision.allowed, result = decision.result.as_str(), "vpn check decided");

            let status = decision.status.as_ref();
            gate.capture(
                ServiceId::PostHog,
                &events::vpn_check_completed(
                    status.map(|s| s.is_connected_to_vpn),
                    status.map(|s| s.is_restricted_region),
                    decision.country_code(),
                    decision.result,
                ),
            );
            if let Some(reason) = decision.block_reason {
                gate.capture(
                    ServiceId::PostHog,
                    &events::vpn_blocked_page_view(reason, decision.country_code()),
                );
            }
            decision
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::RecordingReporter;
    use crate::policy::gate::tests::FakeIntegration;
    use std::cell::Cell;
    use std::rc::Rc;

    struct StubChecker {
        answer: Result<VpnStatus, ConsentError>,
        calls: Rc<Cell<usize>>,
    }

    impl VpnChecker for StubChecker {
        fn check(&self) -> Result<VpnStatus, ConsentError> {
            self.calls.set(self.calls.get() + 1);
            self.answer.clone()
        }
    }

    fn status(vpn: bool, restricted: bool) -> VpnStatus {
        VpnStatus {
            is_connected_to_vpn: vpn,
            is_restricted_region: restricted,
            country_code: Some("DE".to_string()),
        }
    }

    fn failure() -> Result<VpnStatus, ConsentError> {
        Err(ConsentError::Transport("VPN check returned HTTP 502".to_string()))
    }

    #[test]
    fn test_decide_clean_visitor() {
        let decision = decide_access(&Ok(status(false, false)), FailurePolicy::FailClosed);
        assert!(decision.allowed);
        assert_eq!(decision.result, VpnCheckResult::Allowed);
        assert_eq!(decision.block_reason, None);
        assert_eq!(decision.country_code(), Some("DE"));
    }

    #[test]
    fn test_decide_vpn_beats_region() {
        let decision = decide_access(&Ok(status(true, true)), FailurePolicy::FailOpen);
        assert!(!decision.allowed);
        assert_eq!(decision.result, VpnCheckResult::VpnBlocked);
        assert_eq!(decision.block_reason, Some(BlockReason::VpnDetected));
    }

    #[test]
    fn test_decide_restricted_region() {
        let decision = decide_access(&Ok(status(false, true)), FailurePolicy::FailOpen);
        assert!(!decision.allowed);
        assert_eq!(decision.block_reason, Some(BlockReason::RestrictedRegion));
    }

    #[test]
    fn test_decide_failure_policies() {
        let open = decide_access(&failure(), FailurePolicy::FailOpen);
        assert!(open.allowed);
        assert_eq!(open.result, VpnCheckResult::Error);
        assert_eq!(open.block_reason, None);

        let closed = decide_access(&failure(), FailurePolicy::FailClosed);
        assert!(!closed.allowed);
        assert_eq!(closed.block_reason, Some(BlockReason::NetworkError));
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailOpen);
    }

    #[test]
    fn test_guard_checks_once() {
        let calls = Rc::new(Cell::new(0));
        let guard = VpnGuard::new(
            Box::new(StubChecker {
                answer: Ok(status(false, false)),
                calls: calls.clone(),
            }),
            Arc::new(RecordingReporter::new()),
            FailurePolicy::FailOpen,
        );
        let mut gate = AnalyticsGate::new();

        assert!(guard.decision().is_none());
        assert!(guard.check(&mut gate).allowed);
        assert!(guard.check(&mut gate).allowed);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_guard_reports_failures() {
        let reporter = Arc::new(RecordingReporter::new());
        let guard = VpnGuard::new(
            Box::new(StubChecker {
                answer: failure(),
                calls: Rc::new(Cell::new(0)),
            }),
            reporter.clone(),
            FailurePolicy::FailClosed,
        );

        let decision = guard.check(&mut AnalyticsGate::new());
        assert!(!decision.allowed);

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].level, ReportLevel::Warning);
        assert_eq!(reports[0].tags.get("type").map(String::as_str), Some("auth_error"));
        assert_eq!(reports[0].tags.get("check").map(String::as_str), Some("vpn"));
    }

    #[test]
    fn test_guard_tracks_through_posthog() {
        let (posthog, calls) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));
        gate.bootstrap(None);

        let guard = VpnGuard::new(
            Box::new(StubChecker {
                answer: Ok(status(true, false)),
                calls: Rc::new(Cell::new(0)),
            }),
            Arc::new(RecordingReporter::new()),
            FailurePolicy::FailOpen,
        );
        guard.check(&mut gate);

        assert_eq!(
            *calls.borrow(),
            vec![
                "init:Cookieless",
                "capture:marketing_vpn_check_completed",
                "capture:marketing_vpn_blocked_page_view",
            ]
        );
    }

    #[test]
    fn test_guard_tracks_nothing_when_denied() {
        let (posthog, calls) = FakeIntegration::new(ServiceId::PostHog, true);
        let mut gate = AnalyticsGate::new();
        gate.register(Box::new(posthog));
        gate.bootstrap(Some(&crate::protocol::models::ConsentRecord::all(false)));

        let guard = VpnGuard::new(
            Box::new(StubChecker {
                answer: Ok(status(false, false)),
                calls: Rc::new(Cell::new(0)),
            }),
            Arc::new(RecordingReporter::new()),
            FailurePolicy::FailOpen,
        );
        assert!(guard.check(&mut gate).allowed);
        assert!(calls.borrow().is_empty());
    }
}
