//! Retry gate for transaction-backed disbursements.

use chrono::{DateTime, Duration, Utc};
use std::env;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{AppError, DatabaseClient, Disbursement};

/// Default number of windows before a disbursement is exhausted
pub const DEFAULT_MAX_TRIES: i32 = 3;

/// Default distance between gate openings
pub const DEFAULT_RETRY_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct RetryGateConfig {
    pub max_tries: i32,
    pub window: Duration,
}

impl Default for RetryGateConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            window: Duration::hours(DEFAULT_RETRY_WINDOW_HOURS),
        }
    }
}

impl RetryGateConfig {
    /// Reads `MAX_TRIES` and `RETRY_WINDOW_HOURS`
    #[must_use]
    pub fn from_env() -> Self {
        let max_tries = env::var("MAX_TRIES")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(DEFAULT_MAX_TRIES);
        let window_hours = env::var("RETRY_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_RETRY_WINDOW_HOURS);
        Self {
            max_tries,
            window: Duration::hours(window_hours),
        }
    }
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Poll now; persist the new bookkeeping first
    Proceed {
        tries: i32,
        try_again_at: DateTime<Utc>,
    },
    /// Window still closed, nothing changes
    Wait { tries: i32 },
    /// Budget spent; the row never reopens
    Exhausted { tries: i32 },
}

impl GateDecision {
    #[must_use]
    pub fn allowed(&self) -> bool {
        matches!(self, Self::Proceed { .. })
    }

    #[must_use]
    pub fn tries(&self) -> i32 {
        match *self {
            Self::Proceed { tries, .. } | Self::Wait { tries } | Self::Exhausted { tries } => tries,
        }
    }

    /// `(tries, allowed)` pair
    #[must_use]
    pub fn view(&self) -> (i32, bool) {
        (self.tries(), self.allowed())
    }
}

pub struct RetryGate {
    db_client: Arc<dyn DatabaseClient>,
    config: RetryGateConfig,
}

impl RetryGate {
    #[must_use]
    pub fn new(db_client: Arc<dyn DatabaseClient>, config: RetryGateConfig) -> Self {
        Self { db_client, config }
    }

    #[must_use]
    pub fn config(&self) -> &RetryGateConfig {
        &self.config
    }

    /// Pure decision, no persistence
    #[must_use]
    pub fn decide(&self, disbursement: &Disbursement, now: DateTime<Utc>) -> GateDecision {
        let tries = disbursement.tries;
        match disbursement.try_again_at {
            None => GateDecision::Proceed {
                tries,
                try_again_at: now + self.config.window,
            },
            Some(at) if at > now => GateDecision::Wait { tries },
            Some(_) if tries > self.config.max_tries => GateDecision::Exhausted { tries },
            Some(_) => GateDecision::Proceed {
                tries: tries + 1,
                try_again_at: now + self.config.window,
            },
        }
    }

    /// Decide and persist the bookkeeping when the gate opens
    pub async fn decide_tries(
        &self,
        disbursement: &Disbursement,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, AppError> {
        let decision = self.decide(disbursement, now);
        if let GateDecision::Proceed {
            tries,
            try_again_at,
        } = decision
        {
            self.db_client
                .record_disbursement_retry(&disbursement.id, tries, try_again_at)
                .await?;
        }
        debug!(id = %disbursement.id, ?decision, "Retry gate evaluated");
        Ok(decision)
    }

    /// Whether a failed gateway answer should escalate upstream
    #[must_use]
    pub fn beyond_budget(&self, tries: i32) -> bool {
        tries > self.config.max_tries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockDatabaseClient, pending_disbursement};
    use rust_decimal_macros::dec;

    fn gate() -> (Arc<MockDatabaseClient>, RetryGate) {
        let db = Arc::new(MockDatabaseClient::new());
        let gate = RetryGate::new(db.clone(), RetryGateConfig::default());
        (db, gate)
    }

    #[tokio::test]
    async fn test_first_evaluation_opens_window() {
        let (db, gate) = gate();
        let d = pending_disbursement("d-1", Some("pay-1"), dec!(100));
        db.put_disbursement(d.clone());
        let now = Utc::now();

        let decision = gate.decide_tries(&d, now).await.unwrap();
        assert_eq!(decision.view(), (0, true));

        let stored = db.get_disbursement("d-1").await.unwrap().unwrap();
        assert_eq!(stored.tries, 0);
        assert_eq!(stored.try_again_at, Some(now + Duration::hours(24)));
    }

    #[tokio::test]
    async fn test_closed_window_waits_without_changes() {
        let (db, gate) = gate();
        let now = Utc::now();
        let mut d = pending_disbursement("d-1", Some("pay-1"), dec!(100));
        d.tries = 1;
        d.try_again_at = Some(now + Duration::hours(3));
        db.put_disbursement(d.clone());

        let decision = gate.decide_tries(&d, now).await.unwrap();
        assert_eq!(decision, GateDecision::Wait { tries: 1 });
        let stored = db.get_disbursement("d-1").await.unwrap().unwrap();
        assert_eq!(stored.try_again_at, d.try_again_at);
    }

    #[tokio::test]
    async fn test_elapsed_window_increments_and_pushes_out() {
        let (db, gate) = gate();
        let now = Utc::now();
        let mut d = pending_disbursement("d-1", Some("pay-1"), dec!(100));
        d.tries = 2;
        d.try_again_at = Some(now - Duration::minutes(1));
        db.put_disbursement(d.clone());

        let decision = gate.decide_tries(&d, now).await.unwrap();
        assert_eq!(decision.view(), (3, true));
        let stored = db.get_disbursement("d-1").await.unwrap().unwrap();
        assert_eq!(stored.tries, 3);
        assert_eq!(stored.try_again_at, Some(now + Duration::hours(24)));
    }

    #[test]
    fn test_exhausted_after_max_tries() {
        let (_db, gate) = gate();
        let now = Utc::now();
        let mut d = pending_disbursement("d-1", Some("pay-1"), dec!(100));
        d.tries = 4;
        d.try_again_at = Some(now - Duration::hours(1));
        assert_eq!(gate.decide(&d, now), GateDecision::Exhausted { tries: 4 });

        d.tries = 3;
        assert!(gate.decide(&d, now).allowed());
    }

    #[test]
    fn test_future_window_blocks_even_when_exhausted() {
        let (_db, gate) = gate();
        let now = Utc::now();
        let mut d = pending_disbursement("d-1", Some("pay-1"), dec!(100));
        d.tries = 9;
        d.try_again_at = Some(now + Duration::hours(1));
        assert_eq!(gate.decide(&d, now).view(), (9, false));
    }
}
