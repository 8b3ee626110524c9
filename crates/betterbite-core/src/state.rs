//! UI-agnostic user and session state
//!
//! All changes to [`UserState`] go through [`UserState::apply`], one event at
//! a time, so front-ends never mutate quota or tier fields directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::HealthAnalysis;
use crate::tier::{Tier, UNLIMITED_SCANS};

/// Oldest history entries are dropped beyond this many
pub const HISTORY_LIMIT: usize = 50;

/// One completed scan kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub original_images: Vec<String>,
    pub analysis: HealthAnalysis,
    pub timestamp: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(original_images: Vec<String>, analysis: HealthAnalysis) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_images,
            analysis,
            timestamp: Utc::now(),
        }
    }
}

/// Quota fields stored in the remote `profiles` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub tier: Tier,
    pub scans_remaining: i32,
    pub is_paid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An auth session became active
    SignedIn,
    /// The remote profile was fetched; overwrites tier, quota and paid flag
    ProfileLoaded(Profile),
    /// The auth session ended
    SignedOut,
    AnalysisSucceeded(ScanResult),
    AnalysisFailed,
    QuotaExhausted,
    /// The profile store settled on a different quota than the local one
    QuotaSynced(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub is_logged_in: bool,
    pub is_paid: bool,
    pub tier: Tier,
    pub scans_remaining: i32,
    pub history: Vec<ScanResult>,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            is_logged_in: false,
            is_paid: false,
            tier: Tier::Free,
            scans_remaining: Tier::Free.config().scans,
            history: Vec::new(),
        }
    }
}

/// Clamp a stored quota to the values the guard understands
///
/// Only the exact [`UNLIMITED_SCANS`] sentinel means unlimited; any other
/// negative count is an exhausted quota.
pub fn normalize_scans(scans: i32) -> i32 {
    if scans == UNLIMITED_SCANS {
        UNLIMITED_SCANS
    } else {
        scans.max(0)
    }
}

impl UserState {
    pub fn is_unlimited(&self) -> bool {
        self.scans_remaining == UNLIMITED_SCANS
    }

    /// True when the quota guard must redirect to the upsell view
    pub fn quota_exhausted(&self) -> bool {
        !self.is_unlimited() && self.scans_remaining <= 0
    }

    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::SignedIn => {
                self.is_logged_in = true;
            }
            SessionEvent::ProfileLoaded(profile) => {
                self.tier = profile.tier;
                self.scans_remaining = normalize_scans(profile.scans_remaining);
                self.is_paid = profile.is_paid;
            }
            SessionEvent::SignedOut => {
                *self = UserState::default();
            }
            SessionEvent::AnalysisSucceeded(result) => {
                if !self.is_unlimited() {
                    self.scans_remaining = (self.scans_remaining - 1).max(0);
                }
                self.history.push(result);
                if self.history.len() > HISTORY_LIMIT {
                    let excess = self.history.len() - HISTORY_LIMIT;
                    self.history.drain(..excess);
                }
            }
            SessionEvent::QuotaSynced(scans) => {
                self.scans_remaining = normalize_scans(scans);
            }
            SessionEvent::AnalysisFailed | SessionEvent::QuotaExhausted => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ScanResult {
        ScanResult::new(
            vec!["data:image/jpeg;base64,AA".into()],
            HealthAnalysis {
                product_name: "Granola".into(),
                score: 64,
                explanation: String::new(),
                pros: vec![],
                cons: vec![],
                additives: vec![],
                alternatives: None,
            },
        )
    }

    #[test]
    fn test_default_is_free_tier() {
        let user = UserState::default();
        assert!(!user.is_logged_in);
        assert_eq!(user.tier, Tier::Free);
        assert_eq!(user.scans_remaining, 10);
        assert!(user.history.is_empty());
    }

    #[test]
    fn test_success_decrements_and_records() {
        let mut user = UserState::default();
        user.apply(SessionEvent::AnalysisSucceeded(sample_result()));
        assert_eq!(user.scans_remaining, 9);
        assert_eq!(user.history.len(), 1);
    }

    #[test]
    fn test_unlimited_never_decrements() {
        let mut user = UserState::default();
        user.apply(SessionEvent::ProfileLoaded(Profile {
            tier: Tier::Premium,
            scans_remaining: UNLIMITED_SCANS,
            is_paid: true,
        }));
        for _ in 0..5 {
            user.apply(SessionEvent::AnalysisSucceeded(sample_result()));
        }
        assert_eq!(user.scans_remaining, UNLIMITED_SCANS);
        assert!(!user.quota_exhausted());
    }

    #[test]
    fn test_quota_never_goes_negative() {
        let mut user = UserState { scans_remaining: 0, ..UserState::default() };
        user.apply(SessionEvent::AnalysisSucceeded(sample_result()));
        assert_eq!(user.scans_remaining, 0);
        assert!(user.quota_exhausted());
    }

    #[test]
    fn test_negative_remote_quota_is_exhausted_not_unlimited() {
        let mut user = UserState::default();
        user.apply(SessionEvent::ProfileLoaded(Profile {
            tier: Tier::Free,
            scans_remaining: -3,
            is_paid: false,
        }));
        assert_eq!(user.scans_remaining, 0);
        assert!(!user.is_unlimited());
        assert!(user.quota_exhausted());

        user.apply(SessionEvent::QuotaSynced(-2));
        assert_eq!(user.scans_remaining, 0);
        user.apply(SessionEvent::QuotaSynced(UNLIMITED_SCANS));
        assert!(user.is_unlimited());
    }

    #[test]
    fn test_failure_and_exhaustion_leave_state_alone() {
        let mut user = UserState::default();
        let before = user.clone();
        user.apply(SessionEvent::AnalysisFailed);
        user.apply(SessionEvent::QuotaExhausted);
        assert_eq!(user, before);
    }

    #[test]
    fn test_sign_out_resets_everything() {
        let mut user = UserState::default();
        user.apply(SessionEvent::SignedIn);
        user.apply(SessionEvent::ProfileLoaded(Profile {
            tier: Tier::Essential,
            scans_remaining: 31,
            is_paid: true,
        }));
        user.apply(SessionEvent::AnalysisSucceeded(sample_result()));

        user.apply(SessionEvent::SignedOut);
        assert_eq!(user, UserState::default());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut user = UserState { scans_remaining: UNLIMITED_SCANS, ..UserState::default() };
        let mut first_kept = None;
        for i in 0..HISTORY_LIMIT + 5 {
            let result = sample_result();
            if i == 5 {
                first_kept = Some(result.id);
            }
            user.apply(SessionEvent::AnalysisSucceeded(result));
        }
        assert_eq!(user.history.len(), HISTORY_LIMIT);
        assert_eq!(Some(user.history[0].id), first_kept);
    }
}
