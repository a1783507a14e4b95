//! CLI command implementations.

pub mod apply;
pub mod preview;
pub mod purge;
pub mod purge_local;
pub mod simulate;

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

use tmi_flow::program::ProgramStatus;
use tmi_flow::summary::{CountBucket, SimulationSummary};

/// Formats an optional time as `HH:MMZ`, or `-`.
pub(crate) fn hhmm(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%H:%MZ").to_string())
}

/// Formats an optional number, or `-`.
pub(crate) fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub(crate) fn format_status_colored(status: ProgramStatus) -> String {
    let text = status.to_string();
    match status {
        ProgramStatus::Active => text.green().to_string(),
        ProgramStatus::Simulated => text.yellow().to_string(),
        ProgramStatus::Purged => text.red().to_string(),
        ProgramStatus::Draft | ProgramStatus::Completed => text.dimmed().to_string(),
    }
}

pub(crate) fn print_summary(summary: &SimulationSummary) {
    println!("Flights:");
    println!("  Staged:      {}", summary.total_flights);
    println!("  Controlled:  {}", summary.controlled_flights);
    println!("  Slotted:     {}", summary.assigned_flights);
    println!("  Stacked:     {}", summary.stacked_flights);
    println!("  Exempt:      {}", summary.exempt_flights);
    println!("  Capped:      {}", summary.capped_flights);
    if summary.total_slots > 0 {
        println!();
        println!("Slots:");
        println!("  Total:       {}", summary.total_slots);
        println!("  Assigned:    {}", summary.assigned_slots);
        println!("  Open:        {}", summary.open_slots);
        println!("  Utilization: {:.1}%", summary.utilization_pct);
    }
    println!();
    println!("Delay (all controlled):");
    println!(
        "  Total {} min, avg {:.1} min, max {} min over {} flights",
        summary.delay.total_min, summary.delay.avg_min, summary.delay.max_min, summary.delay.count
    );
    println!("Delay (delayed flights only):");
    println!(
        "  Total {} min, avg {:.1} min, max {} min over {} flights",
        summary.positive_delay.total_min,
        summary.positive_delay.avg_min,
        summary.positive_delay.max_min,
        summary.positive_delay.count
    );
}

pub(crate) fn print_buckets(title: &str, buckets: &[CountBucket]) {
    if buckets.is_empty() {
        return;
    }
    let line = buckets
        .iter()
        .map(|b| format!("{} {}", b.key, b.count))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  {title:<10} {line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_optional_fields() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 18, 5, 0).single();
        assert_eq!(hhmm(at), "18:05Z");
        assert_eq!(hhmm(None), "-");
        assert_eq!(or_dash(Some(12)), "12");
        assert_eq!(or_dash::<i64>(None), "-");
    }
}
