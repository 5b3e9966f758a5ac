//! Per-run purchase and spend accounting.

use chrono::{DateTime, Local};
use std::time::Instant;

/// Skystone cost of one shop refresh.
pub const REFRESH_COST: u32 = 3;

/// One tracked shop item and how many were bought this run.
#[derive(Clone, Debug)]
pub struct ItemStat {
    pub name: String,
    pub price: u64,
    pub count: u32,
}

/// Accumulates refresh and purchase counts for a single run.
#[derive(Clone, Debug)]
pub struct PurchaseTracker {
    items: Vec<ItemStat>,
    refresh_count: u32,
    start_time: DateTime<Local>,
    started: Instant,
}

impl PurchaseTracker {
    pub fn new(items: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|(name, price)| ItemStat {
                    name,
                    price,
                    count: 0,
                })
                .collect(),
            refresh_count: 0,
            start_time: Local::now(),
            started: Instant::now(),
        }
    }

    pub fn items(&self) -> &[ItemStat] {
        &self.items
    }

    pub fn record_purchase(&mut self, index: usize) {
        if let Some(item) = self.items.get_mut(index) {
            item.count += 1;
        }
    }

    pub fn increment_refresh(&mut self) {
        self.refresh_count += 1;
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_count
    }

    pub fn skystones_spent(&self) -> u32 {
        self.refresh_count * REFRESH_COST
    }

    pub fn gold_spent(&self) -> u64 {
        self.items
            .iter()
            .map(|item| item.price * item.count as u64)
            .sum()
    }

    pub fn total_purchases(&self) -> u32 {
        self.items.iter().map(|item| item.count).sum()
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
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
    fn test_new_tracker_is_empty() {
        let t = tracker();
        assert_eq!(t.refresh_count(), 0);
        assert_eq!(t.skystones_spent(), 0);
        assert_eq!(t.gold_spent(), 0);
        assert_eq!(t.total_purchases(), 0);
    }

    #[test]
    fn test_refreshes_cost_three_skystones_each() {
        let mut t = tracker();
        for _ in 0..4 {
            t.increment_refresh();
        }
        assert_eq!(t.refresh_count(), 4);
        assert_eq!(t.skystones_spent(), 12);
    }

    #[test]
    fn test_gold_spend_sums_per_item_prices() {
        let mut t = tracker();
        t.record_purchase(0);
        t.record_purchase(0);
        t.record_purchase(1);
        assert_eq!(t.total_purchases(), 3);
        assert_eq!(t.gold_spent(), 2 * 184_000 + 280_000);
        assert_eq!(t.items()[0].count, 2);
        assert_eq!(t.items()[1].count, 1);
    }

    #[test]
    fn test_out_of_range_purchase_is_ignored() {
        let mut t = tracker();
        t.record_purchase(5);
        assert_eq!(t.total_purchases(), 0);
    }
}
