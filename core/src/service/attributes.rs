use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use crate::config::TaxConfig;
use crate::model::day_record::DayRecord;
use crate::model::ledger::{Ledger, TotalPolicy};
use crate::model::stats::MonthSummary;
use crate::scheduler::ScheduleStatus;

pub const UNIT_OF_MEASUREMENT: &str = "€";

/// Read-only view of the ledger, as exposed to the outside.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SensorAttributes {
    pub total: f64,
    pub unit_of_measurement: &'static str,
    pub latest_date: Option<NaiveDate>,
    pub latest_amount: f64,
    pub price_per_person: f64,
    pub home_zone: String,
    pub total_policy: TotalPolicy,
    pub days: BTreeMap<NaiveDate, DayRecord>,
    pub monthly: BTreeMap<String, MonthSummary>,
    pub schedule: ScheduleStatus,
    pub last_updated: Option<DateTime<Local>>,
}

impl SensorAttributes {
    pub fn from_ledger(ledger: &Ledger, config: &TaxConfig, schedule: ScheduleStatus) -> Self {
        let latest = ledger.latest();
        Self {
            total: ledger.total(),
            unit_of_measurement: UNIT_OF_MEASUREMENT,
            latest_date: latest.map(|r| r.date),
            latest_amount: latest.map(|r| r.amount).unwrap_or(0.0),
            price_per_person: config.price_per_person,
            home_zone: config.home_zone.clone(),
            total_policy: ledger.policy(),
            days: ledger.days().clone(),
            monthly: ledger.monthly_summary(),
            schedule,
            last_updated: ledger.last_updated(),
        }
    }
}
