//! Health reporting for pool managers

use crate::metrics::PoolStats;

/// Health snapshot derived from a manager's live counters.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthStatus {
    /// Whether the manager looks healthy.
    pub is_healthy: bool,

    /// Checked-out connections as a fraction of total capacity (0.0 to 1.0).
    pub utilization: f64,

    /// Idle connections ready for reuse.
    pub available: usize,

    /// Connections currently checked out.
    pub using: usize,

    /// Acquire calls queued for a slot.
    pub waiting: usize,

    /// Maximum connections the manager may hold across all sub-pools.
    pub capacity: usize,

    /// Warning messages.
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub(crate) fn new(stats: PoolStats, capacity: usize) -> Self {
        let utilization = if capacity > 0 {
            stats.using as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if stats.waiting > 0 {
            warnings.push(format!("{} acquire calls waiting for a slot", stats.waiting));
        }

        Self {
            is_healthy,
            utilization,
            available: stats.available,
            using: stats.using,
            waiting: stats.waiting,
            capacity,
            warnings,
        }
    }

    /// Check if the manager is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_pool_is_healthy() {
        let status = HealthStatus::new(
            PoolStats {
                size: 2,
                available: 2,
                using: 0,
                waiting: 0,
            },
            10,
        );
        assert!(status.is_healthy());
        assert!(status.warnings.is_empty());
        assert_eq!(status.utilization, 0.0);
    }

    #[test]
    fn saturated_pool_reports_unhealthy() {
        let status = HealthStatus::new(
            PoolStats {
                size: 10,
                available: 0,
                using: 10,
                waiting: 3,
            },
            10,
        );
        assert!(!status.is_healthy());
        assert_eq!(status.warnings.len(), 2);
    }
}
