use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::day_record::{round_currency, DayRecord};
use crate::model::stats::MonthSummary;

pub const SEASON_FIRST_MONTH: u32 = 3;
pub const SEASON_LAST_MONTH: u32 = 11;

/// Which days count towards the running total.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TotalPolicy {
    #[default]
    All,
    /// Only March through November.
    Season,
}

impl TotalPolicy {
    pub fn counts(&self, date: NaiveDate) -> bool {
        match self {
            TotalPolicy::All => true,
            TotalPolicy::Season => is_in_season(date),
        }
    }
}

pub fn is_in_season(date: NaiveDate) -> bool {
    (SEASON_FIRST_MONTH..=SEASON_LAST_MONTH).contains(&date.month())
}

/// On-disk shape of the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub days: BTreeMap<NaiveDate, DayRecord>,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    days: BTreeMap<NaiveDate, DayRecord>,
    total: f64,
    policy: TotalPolicy,
    last_updated: Option<DateTime<Local>>,
}

impl Ledger {
    pub fn new(policy: TotalPolicy) -> Self {
        Self {
            days: BTreeMap::new(),
            total: 0.0,
            policy,
            last_updated: None,
        }
    }

    /// Builds a ledger from a snapshot. The stored total is ignored and recomputed.
    pub fn from_snapshot(snapshot: LedgerSnapshot, policy: TotalPolicy) -> Self {
        let mut days = snapshot.days;
        // The map key wins over whatever date the record itself carries.
        for (date, record) in days.iter_mut() {
            record.date = *date;
        }
        let mut ledger = Self {
            days,
            total: 0.0,
            policy,
            last_updated: snapshot.last_updated,
        };
        ledger.recompute_total();
        ledger
    }

    pub fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            days: self.days.clone(),
            total: self.total,
            last_updated: self.last_updated,
        }
    }

    /// Inserts or overwrites the record for its day. Returns the replaced record.
    pub fn upsert(&mut self, record: DayRecord) -> Option<DayRecord> {
        let previous = self.days.insert(record.date, record);
        self.recompute_total();
        previous
    }

    pub fn clear(&mut self) {
        self.days.clear();
        self.recompute_total();
    }

    pub fn touch(&mut self, at: DateTime<Local>) {
        self.last_updated = Some(at);
    }

    fn recompute_total(&mut self) {
        let sum: f64 = self
            .days
            .values()
            .filter(|r| self.policy.counts(r.date))
            .map(|r| r.amount)
            .sum();
        self.total = round_currency(sum);
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn policy(&self) -> TotalPolicy {
        self.policy
    }

    pub fn last_updated(&self) -> Option<DateTime<Local>> {
        self.last_updated
    }

    pub fn days(&self) -> &BTreeMap<NaiveDate, DayRecord> {
        &self.days
    }

    /// Most recent recorded day.
    pub fn latest(&self) -> Option<&DayRecord> {
        self.days.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Per-month totals keyed by "YYYY-MM". Every recorded day is included, regardless of policy.
    pub fn monthly_summary(&self) -> BTreeMap<String, MonthSummary> {
        let mut months: BTreeMap<(i32, u32), MonthSummary> = BTreeMap::new();
        for record in self.days.values() {
            let (year, month) = (record.date.year(), record.date.month());
            months
                .entry((year, month))
                .or_insert_with(|| MonthSummary::new(year, month))
                .add(record);
        }
        months.into_values().map(|m| (m.key(), m)).collect()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(TotalPolicy::default())
    }
}
