//! Counter snapshots and export for pool managers

use std::collections::HashMap;

/// Point-in-time counters for one sub-pool or an aggregate of several.
///
/// `size` is every tracked connection (idle plus checked out), `available`
/// the idle set, `using` the checked-out set, and `waiting` the acquire
/// calls currently queued for a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    pub size: usize,
    pub available: usize,
    pub using: usize,
    pub waiting: usize,
}

impl PoolStats {
    /// Sum two snapshots, used when aggregating across sub-pools.
    pub fn merge(self, other: PoolStats) -> PoolStats {
        PoolStats {
            size: self.size + other.size,
            available: self.available + other.available,
            using: self.using + other.using,
            waiting: self.waiting + other.waiting,
        }
    }

    /// Export the snapshot as a string map.
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("size".to_string(), self.size.to_string());
        metrics.insert("available".to_string(), self.available.to_string());
        metrics.insert("using".to_string(), self.using.to_string());
        metrics.insert("waiting".to_string(), self.waiting.to_string());
        metrics
    }
}

/// Text-exposition exporter for pool counters.
pub struct StatsExporter;

impl StatsExporter {
    /// Export labeled per-sub-pool snapshots in Prometheus exposition
    /// format. `entries` pairs a routing-key label (e.g. `"eu-1/read"`)
    /// with its snapshot.
    pub fn export_text(pool_name: &str, entries: &[(String, PoolStats)]) -> String {
        let mut output = String::new();

        for (help, name, pick) in [
            (
                "Tracked connections (idle plus checked out)",
                "shardpool_connections_total",
                (|s: &PoolStats| s.size) as fn(&PoolStats) -> usize,
            ),
            (
                "Idle connections ready for reuse",
                "shardpool_connections_available",
                |s: &PoolStats| s.available,
            ),
            (
                "Connections currently checked out",
                "shardpool_connections_using",
                |s: &PoolStats| s.using,
            ),
            (
                "Acquire calls queued for a slot",
                "shardpool_acquires_waiting",
                |s: &PoolStats| s.waiting,
            ),
        ] {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} gauge\n"));
            for (key, stats) in entries {
                let labels = Self::format_labels(pool_name, key);
                output.push_str(&format!("{name}{{{labels}}} {}\n", pick(stats)));
            }
        }

        output
    }

    fn format_labels(pool_name: &str, key: &str) -> String {
        format!("pool=\"{pool_name}\",key=\"{key}\"")
    }
}
