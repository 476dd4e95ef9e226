//! Counter metrics for monotonically increasing values.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    /// Get the counter name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the counter help text.
    pub fn help(&self) -> &'static str {
        self.help
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Increment the counter by `n`.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A counter keyed by a fixed set of label values, e.g. per table.
#[derive(Debug)]
pub struct LabeledCounter<const N: usize> {
    name: &'static str,
    help: &'static str,
    label_names: [&'static str; N],
    values: DashMap<[String; N], AtomicU64>,
}

impl<const N: usize> LabeledCounter<N> {
    /// Create a new labeled counter.
    pub fn new(name: &'static str, help: &'static str, label_names: [&'static str; N]) -> Self {
        Self {
            name,
            help,
            label_names,
            values: DashMap::new(),
        }
    }

    /// Get the counter name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the counter help text.
    pub fn help(&self) -> &'static str {
        self.help
    }

    /// Get the label names.
    pub fn label_names(&self) -> &[&'static str; N] {
        &self.label_names
    }

    /// Increment by `n` for the given label values.
    pub fn inc_by(&self, labels: [&str; N], n: u64) {
        self.values
            .entry(labels.map(str::to_string))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    /// Value for the given label values, zero if never incremented.
    pub fn get(&self, labels: [&str; N]) -> u64 {
        self.values
            .get(&labels.map(str::to_string))
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum across all label values.
    pub fn total(&self) -> u64 {
        self.values
            .iter()
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "A test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        counter.inc_by(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_labeled_counter() {
        let counter = LabeledCounter::new("partitions_created", "Created partitions", ["table"]);

        counter.inc_by(["events"], 1);
        counter.inc_by(["events"], 2);
        counter.inc_by(["audit_log"], 1);

        assert_eq!(counter.get(["events"]), 3);
        assert_eq!(counter.get(["missing"]), 0);
        assert_eq!(counter.total(), 4);
    }
}
