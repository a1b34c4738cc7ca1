use std::collections::BTreeMap;

use chrono::NaiveDate;
use tabled::settings::object::Rows;
use tabled::settings::{Color, Modify, Style};
use tabled::{Table, Tabled};
use toeristenbelasting_core::{DayRecord, ScheduleStatus, SensorAttributes};

#[derive(Tabled)]
struct DayRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "In zone")]
    persons: u32,
    #[tabled(rename = "Guests")]
    guests: u32,
    #[tabled(rename = "Total")]
    total: u32,
    #[tabled(rename = "Amount")]
    amount: String,
}

#[derive(Tabled)]
struct MonthRow {
    #[tabled(rename = "Month")]
    month: String,
    #[tabled(rename = "Days")]
    days: u32,
    #[tabled(rename = "Person-nights")]
    persons: u32,
    #[tabled(rename = "Amount")]
    amount: String,
}

fn euro(amount: f64) -> String {
    format!("€ {:.2}", amount)
}

fn styled(mut table: Table) -> String {
    table
        .with(Style::modern())
        .with(Modify::new(Rows::first()).with(Color::FG_CYAN));
    table.to_string()
}

/// Newest day first.
pub fn render_days(days: &BTreeMap<NaiveDate, DayRecord>) -> String {
    let rows: Vec<DayRow> = days
        .values()
        .rev()
        .map(|r| DayRow {
            date: format!("{} ({})", r.date.format("%Y-%m-%d"), r.date.format("%a")),
            persons: r.persons_in_zone,
            guests: r.guests,
            total: r.total_persons,
            amount: euro(r.amount),
        })
        .collect();
    styled(Table::new(rows))
}

pub fn render_months(attributes: &SensorAttributes) -> String {
    let rows: Vec<MonthRow> = attributes
        .monthly
        .iter()
        .rev()
        .map(|(key, m)| MonthRow {
            month: key.clone(),
            days: m.days,
            persons: m.total_persons,
            amount: euro(m.amount),
        })
        .collect();
    styled(Table::new(rows))
}

pub fn describe_schedule(status: &ScheduleStatus) -> String {
    match status {
        ScheduleStatus::NotScheduled => "not scheduled".to_string(),
        ScheduleStatus::WaitingForTimeSource { reason, retry_at } => format!(
            "waiting for time source ({}), retry at {}",
            reason,
            retry_at.format("%Y-%m-%d %H:%M:%S")
        ),
        ScheduleStatus::Scheduled { update_time, next_run } => format!(
            "daily at {}, next run {}",
            update_time.format("%H:%M:%S"),
            next_run.format("%Y-%m-%d %H:%M:%S %:z")
        ),
    }
}

pub fn show_status(attributes: &SensorAttributes) {
    println!(
        "\x1b[1;36mToeristenbelasting\x1b[0m {} ({} days, policy {:?})",
        euro(attributes.total),
        attributes.days.len(),
        attributes.total_policy
    );
    println!(
        "  Price per person: {}  Zone: {}",
        euro(attributes.price_per_person),
        attributes.home_zone
    );
    if let Some(date) = attributes.latest_date {
        println!("  Latest: {} {}", date, euro(attributes.latest_amount));
    }
    if let Some(updated) = attributes.last_updated {
        println!("  Last updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  Schedule: {}", describe_schedule(&attributes.schedule));

    if attributes.days.is_empty() {
        println!("\nNo days recorded yet.");
        return;
    }
    println!("\n{}", render_months(attributes));
    println!("\n{}", render_days(&attributes.days));
}
