//! Named event counters, grouped per stage.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// Counter groups: group name -> counter name -> count.
///
/// Each worker thread fills its own set; sets are merged after a parallel run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    groups: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Counters {
    pub fn new() -> Self {
        Counters::default()
    }

    /// Make a counter visible in the summary even if it stays at zero.
    pub fn register(&mut self, group: &str, name: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0);
    }

    #[inline]
    pub fn inc(&mut self, group: &str, name: &str) {
        self.add(group, name, 1);
    }

    pub fn add(&mut self, group: &str, name: &str, n: u64) {
        *self
            .groups
            .entry(group.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0) += n;
    }

    pub fn get(&self, group: &str, name: &str) -> u64 {
        self.groups
            .get(group)
            .and_then(|g| g.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// Groups in name order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, u64>)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn merge(&mut self, other: &Counters) {
        for (group, counts) in &other.groups {
            let target = self.groups.entry(group.clone()).or_default();
            for (name, n) in counts {
                *target.entry(name.clone()).or_insert(0) += n;
            }
        }
    }

    /// Human-readable table; groups with `processed`/`passes` also report the pass rate.
    pub fn summary(&self) -> String {
        let mut out = String::from("Counters:");
        for (group, counts) in self.groups() {
            let processed = counts.get("processed").copied();
            let passes = counts.get("passes").copied();
            match (processed, passes) {
                (Some(total), Some(passed)) => {
                    let pct = if total > 0 {
                        (passed as f64 / total as f64) * 100.0
                    } else {
                        100.0
                    };
                    let _ = write!(out, "\n{}: {}/{} passed ({:.1}%)", group, passed, total, pct);
                }
                _ => {
                    let _ = write!(out, "\n{}:", group);
                }
            }
            for (name, n) in counts {
                if name == "processed" || name == "passes" {
                    continue;
                }
                let _ = write!(out, "\n - {}: {}", name, n);
            }
        }
        out
    }
}
