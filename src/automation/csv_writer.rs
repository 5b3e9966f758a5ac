//! Run-history CSV output.
//!
//! Each distinct set of tracked items gets its own file so the column
//! layout inside a file never changes. Rows are appended across runs.

use crate::automation::tracker::PurchaseTracker;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name derived from the tracked item set, e.g.
/// `refreshAttemptCoveMyst.csv` for Covenant + Mystic.
pub fn history_file_name(tracker: &PurchaseTracker) -> String {
    let mut name = String::from("refreshAttempt");
    for item in tracker.items() {
        name.extend(item.name.chars().filter(|c| c.is_alphanumeric()).take(4));
    }
    name.push_str(".csv");
    name
}

fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

/// Appends one run summary row to the history file in `dir`, writing
/// the header first if the file is new. Returns the file path.
pub fn append_run_to(dir: &Path, tracker: &PurchaseTracker) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create history directory {}", dir.display()))?;
    let path = dir.join(history_file_name(tracker));
    let is_new = !path.exists();

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open history file {}", path.display()))?;

    if is_new {
        let mut header = String::from("Time,Duration,Refresh count,Skystone spent,Gold spent");
        for item in tracker.items() {
            header.push(',');
            header.push_str(&item.name);
        }
        writeln!(file, "{}", header)?;
    }

    writeln!(
        file,
        "{},{},{},{},{}{}",
        tracker.start_time().format("%Y-%m-%d %H:%M:%S"),
        format_duration(tracker.elapsed_secs()),
        tracker.refresh_count(),
        tracker.skystones_spent(),
        tracker.gold_spent(),
        tracker
            .items()
            .iter()
            .map(|item| format!(",{}", item.count))
            .collect::<String>()
    )?;

    Ok(path)
}

/// Appends one run summary to the default history directory.
pub fn append_run(tracker: &PurchaseTracker) -> Result<PathBuf> {
    append_run_to(&crate::paths::get_history_dir(), tracker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PurchaseTracker {
        PurchaseTracker::new([
            ("Covenant bookmark".to_string(), 184_000),
            ("Mystic medal".to_string(), 280_000),
        ])
    }

    #[test]
    fn test_file_name_uses_item_name_prefixes() {
        assert_eq!(history_file_name(&tracker()), "refreshAttemptCoveMyst.csv");
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(83), "0:01:23");
        assert_eq!(format_duration(3723), "1:02:03");
    }

    #[test]
    fn test_header_written_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker();
        t.increment_refresh();
        t.increment_refresh();
        t.record_purchase(0);

        let path = append_run_to(dir.path(), &t).unwrap();
        append_run_to(dir.path(), &t).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Time,Duration,Refresh count,Skystone spent,Gold spent,Covenant bookmark,Mystic medal"
        );
        assert!(lines[1].ends_with(",2,6,184000,1,0"));
        assert!(lines[2].ends_with(",2,6,184000,1,0"));
    }
}
