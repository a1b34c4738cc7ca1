pub mod day_record;
pub mod ledger;
pub mod stats;
