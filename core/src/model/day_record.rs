use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Rounds a currency amount to whole cents.
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub persons_in_zone: u32,
    pub guests: u32,
    pub total_persons: u32,
    pub amount: f64,
}

impl DayRecord {
    pub fn new(date: NaiveDate, persons_in_zone: u32, guests: u32, price_per_person: f64) -> Self {
        let total_persons = persons_in_zone.saturating_add(guests);
        Self {
            date,
            persons_in_zone,
            guests,
            total_persons,
            amount: round_currency(total_persons as f64 * price_per_person),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_persons == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn test_amount_is_total_times_price() {
        let record = DayRecord::new(day(1), 2, 1, 2.40);
        assert_eq!(record.total_persons, 3);
        assert_eq!(record.amount, 7.20);
    }

    #[test]
    fn test_amount_rounds_to_cents() {
        let record = DayRecord::new(day(2), 3, 0, 0.333);
        assert_eq!(record.amount, 1.0);

        let record = DayRecord::new(day(2), 1, 0, 0.005);
        assert_eq!(record.amount, 0.01);
    }

    #[test]
    fn test_zero_presence_is_still_a_record() {
        let record = DayRecord::new(day(3), 0, 0, 2.40);
        assert!(record.is_empty());
        assert_eq!(record.amount, 0.0);
    }
}
