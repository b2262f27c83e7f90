use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;

use crate::store::{StoreError, UsageRepository};
use crate::store::types::clamp_limits;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time. Injected so day rollover and cache expiry can
/// be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real UTC clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// 00:00 UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

// ---------------------------------------------------------------------------
// Admission mode
// ---------------------------------------------------------------------------

/// Degradation level derived from today's spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionMode {
    Normal,
    Soft,
    Hard,
}

impl AdmissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }

    /// Evaluated top-down: hard limit first, then soft.
    pub fn derive(spend: f64, soft_limit: f64, hard_limit: f64) -> Self {
        if spend >= hard_limit {
            Self::Hard
        } else if spend >= soft_limit {
            Self::Soft
        } else {
            Self::Normal
        }
    }
}

impl std::fmt::Display for AdmissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BudgetLedger
// ---------------------------------------------------------------------------

/// Reporting view of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerInfo {
    pub mode: AdmissionMode,
    pub soft_limit: f64,
    pub hard_limit: f64,
    pub today_spend: f64,
}

#[derive(Debug)]
struct LedgerState {
    soft_limit: f64,
    hard_limit: f64,
    today_spend: f64,
    mode: AdmissionMode,
    last_observed: Option<DateTime<Utc>>,
}

impl LedgerState {
    /// Day-boundary check shared by every ledger operation.
    fn reconcile(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_observed {
            if last.date_naive() != now.date_naive() {
                tracing::info!(
                    previous_spend = self.today_spend,
                    day = %now.date_naive(),
                    "Daily budget rolled over"
                );
                self.today_spend = 0.0;
                self.recompute();
            }
        }
        self.last_observed = Some(now);
    }

    fn recompute(&mut self) {
        self.mode = AdmissionMode::derive(self.today_spend, self.soft_limit, self.hard_limit);
    }
}

/// Today's cumulative paid spend and the admission mode derived from it.
///
/// The in-memory counter is the source of truth between [`refresh`] calls.
/// All state sits behind one mutex so concurrent registrations serialize.
///
/// [`refresh`]: BudgetLedger::refresh
pub struct BudgetLedger {
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl BudgetLedger {
    pub fn new(soft_limit: f64, hard_limit: f64, clock: Arc<dyn Clock>) -> Self {
        let (soft_limit, hard_limit) = clamp_limits(soft_limit, hard_limit);
        let mut state = LedgerState {
            soft_limit,
            hard_limit,
            today_spend: 0.0,
            mode: AdmissionMode::Normal,
            last_observed: None,
        };
        state.recompute();
        Self {
            clock,
            state: Mutex::new(state),
        }
    }

    /// Run `f` against reconciled state.
    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("ledger mutex poisoned");
        state.reconcile(now);
        f(&mut state)
    }

    /// Re-derive today's spend from the usage store, starting at 00:00 UTC.
    pub async fn refresh(&self, usage: &dyn UsageRepository) -> Result<AdmissionMode, StoreError> {
        let now = self.clock.now();
        let spend = usage.usage_total_since(start_of_day(now)).await?;

        let mut state = self.state.lock().expect("ledger mutex poisoned");
        state.reconcile(now);
        state.today_spend = non_negative(spend);
        state.recompute();
        tracing::debug!(today_spend = state.today_spend, mode = %state.mode, "Ledger refreshed");
        Ok(state.mode)
    }

    /// Add `cost` to today's spend. Negative or NaN costs count as zero.
    pub fn register(&self, cost: f64) -> AdmissionMode {
        self.with_state(|state| {
            let before = state.mode;
            state.today_spend += non_negative(cost);
            state.recompute();
            if state.mode != before {
                tracing::warn!(
                    today_spend = state.today_spend,
                    from = %before,
                    to = %state.mode,
                    "Budget admission mode changed"
                );
            }
            state.mode
        })
    }

    /// Replace both limits, clamping negatives to zero and raising `hard` to
    /// `soft` when needed. Returns the applied pair.
    pub fn set_limits(&self, soft_limit: f64, hard_limit: f64) -> (f64, f64) {
        let (soft_limit, hard_limit) = clamp_limits(soft_limit, hard_limit);
        self.with_state(|state| {
            state.soft_limit = soft_limit;
            state.hard_limit = hard_limit;
            state.recompute();
        });
        (soft_limit, hard_limit)
    }

    pub fn mode(&self) -> AdmissionMode {
        self.with_state(|state| state.mode)
    }

    pub fn today_spend(&self) -> f64 {
        self.with_state(|state| state.today_spend)
    }

    /// Snapshot for reporting; spend rounded to four decimals.
    pub fn info(&self) -> LedgerInfo {
        self.with_state(|state| LedgerInfo {
            mode: state.mode,
            soft_limit: state.soft_limit,
            hard_limit: state.hard_limit,
            today_spend: (state.today_spend * 10_000.0).round() / 10_000.0,
        })
    }
}

fn non_negative(value: f64) -> f64 {
    if value > 0.0 { value } else { 0.0 }
}
