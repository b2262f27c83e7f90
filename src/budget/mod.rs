pub mod ledger;
pub mod report;
pub mod usage;

pub use self::ledger::{AdmissionMode, BudgetLedger, Clock, LedgerInfo, ManualClock, SystemClock};
pub use self::usage::{UsageCounters, UsageCountersSnapshot, UsageEntry, UsageRecorder};
