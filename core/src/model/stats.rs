use serde::{Deserialize, Serialize};

use crate::model::day_record::{round_currency, DayRecord};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MonthSummary {
    pub year: i32,
    pub month: u32,
    pub days: u32,
    pub persons_in_zone: u32,
    pub guests: u32,
    pub total_persons: u32,
    pub amount: f64,
}

impl MonthSummary {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            ..Default::default()
        }
    }

    /// Key used in the monthly attribute map: "YYYY-MM".
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn add(&mut self, record: &DayRecord) {
        self.days = self.days.saturating_add(1);
        self.persons_in_zone = self.persons_in_zone.saturating_add(record.persons_in_zone);
        self.guests = self.guests.saturating_add(record.guests);
        self.total_persons = self.total_persons.saturating_add(record.total_persons);
        self.amount = round_currency(self.amount + record.amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_add_accumulates_and_saturates() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let mut month = MonthSummary::new(2024, 7);
        month.add(&DayRecord::new(date, 2, 1, 2.40));
        month.add(&DayRecord::new(date, 1, 0, 2.40));
        assert_eq!(month.key(), "2024-07");
        assert_eq!(month.days, 2);
        assert_eq!(month.total_persons, 4);
        assert_eq!(month.amount, 9.60);

        month.add(&DayRecord::new(date, u32::MAX, 0, 2.40));
        assert_eq!(month.persons_in_zone, u32::MAX);
        assert_eq!(month.total_persons, u32::MAX);
    }
}
