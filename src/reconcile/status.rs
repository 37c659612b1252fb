//! Grace-Window Status Transitions
//!
//! Decides when a device or link seen (or not seen) by UISP changes between
//! Active and Inactive. Going inactive needs the record to have been unseen
//! for longer than the grace window, so short outages never flap a record.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Outcome of comparing internal status with UISP liveness
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDecision {
    Unchanged,
    /// Mark inactive; `abandon_date` is the last-seen date when known
    Deactivate { abandon_date: Option<NaiveDate> },
    /// Mark active again; `stale_since` is set when the record had been
    /// abandoned for longer than the warning threshold
    Reactivate { stale_since: Option<NaiveDate> },
}

/// Grace window and reactivation warning threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    pub grace_days: u32,
    pub reactivation_warning_days: u32,
}

impl StatusPolicy {
    pub fn new(grace_days: u32, reactivation_warning_days: u32) -> Self {
        Self {
            grace_days,
            reactivation_warning_days,
        }
    }

    /// Decide the transition for one record.
    ///
    /// `active` is the internal status, `online` what UISP reports now.
    pub fn decide(
        &self,
        active: bool,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
        abandon_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> StatusDecision {
        match (active, online) {
            (true, false) => match last_seen {
                Some(seen) if now - seen <= Duration::days(i64::from(self.grace_days)) => {
                    StatusDecision::Unchanged
                }
                seen => StatusDecision::Deactivate {
                    abandon_date: seen.map(|s| s.date_naive()),
                },
            },
            (false, true) => {
                let threshold = Duration::days(i64::from(self.reactivation_warning_days));
                let stale_since =
                    abandon_date.filter(|abandoned| now.date_naive() - *abandoned > threshold);
                StatusDecision::Reactivate { stale_since }
            }
            _ => StatusDecision::Unchanged,
        }
    }

    pub fn deactivation_message(&self) -> String {
        format!(
            "Marked as Inactive due to it being offline in UISP for more than {} days",
            self.grace_days
        )
    }

    pub fn reactivation_messages(&self, stale_since: Option<NaiveDate>, now: DateTime<Utc>) -> Vec<String> {
        let mut messages = vec!["Marked as Active due to it coming back online in UISP".to_string()];
        if let Some(abandoned) = stale_since {
            messages.push(format!(
                "Warning: it was abandoned on {} ({} days ago), please verify it is still at this node",
                abandoned,
                (now.date_naive() - abandoned).num_days()
            ));
        }
        messages
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::new(30, 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_offline_within_grace_stays_active() {
        let policy = StatusPolicy::default();
        let seen = now() - Duration::days(29);
        assert_eq!(
            policy.decide(true, false, Some(seen), None, now()),
            StatusDecision::Unchanged
        );
    }

    #[test]
    fn test_offline_past_grace_deactivates() {
        let policy = StatusPolicy::default();
        let seen = now() - Duration::days(31);
        assert_eq!(
            policy.decide(true, false, Some(seen), None, now()),
            StatusDecision::Deactivate {
                abandon_date: Some(seen.date_naive())
            }
        );
    }

    #[test]
    fn test_never_seen_deactivates_immediately() {
        let policy = StatusPolicy::default();
        assert_eq!(
            policy.decide(true, false, None, None, now()),
            StatusDecision::Deactivate { abandon_date: None }
        );
    }

    #[test]
    fn test_reactivation_warns_when_stale() {
        let policy = StatusPolicy::default();
        let recent = now().date_naive() - Duration::days(10);
        let ancient = now().date_naive() - Duration::days(400);

        assert_eq!(
            policy.decide(false, true, None, Some(recent), now()),
            StatusDecision::Reactivate { stale_since: None }
        );
        assert_eq!(
            policy.decide(false, true, None, Some(ancient), now()),
            StatusDecision::Reactivate {
                stale_since: Some(ancient)
            }
        );

        let messages = policy.reactivation_messages(Some(ancient), now());
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("400 days ago"));
    }

    #[test]
    fn test_steady_states_are_unchanged() {
        let policy = StatusPolicy::default();
        assert_eq!(policy.decide(true, true, None, None, now()), StatusDecision::Unchanged);
        assert_eq!(policy.decide(false, false, None, None, now()), StatusDecision::Unchanged);
    }
}
