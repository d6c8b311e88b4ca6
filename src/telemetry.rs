/// Telemetry events emitted by the dispatcher as work items are processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent {
    /// Job submitted to the cluster queue
    Queued,
    /// Job executed locally to completion
    Executed { exit_ok: bool },
    /// Dry run: command recorded, nothing executed or submitted
    Planned,
    /// Cluster submission failed to go through
    SubmitFailed,
    /// Item skipped (cancellation)
    Skipped,
    /// Batch pause point reached
    BatchPause,
}

/// Statistics aggregated from dispatch events
#[derive(Debug, Default, Clone)]
pub struct DispatchStats {
    pub queued: usize,
    pub executed: usize,
    pub exec_failures: usize,
    pub planned: usize,
    pub submit_failures: usize,
    pub skipped: usize,
    pub batch_pauses: usize,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a dispatch event
    pub fn update(&mut self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Queued => {
                self.queued += 1;
            }
            DispatchEvent::Executed { exit_ok } => {
                self.executed += 1;
                if !exit_ok {
                    self.exec_failures += 1;
                }
            }
            DispatchEvent::Planned => {
                self.planned += 1;
            }
            DispatchEvent::SubmitFailed => {
                self.submit_failures += 1;
            }
            DispatchEvent::Skipped => {
                self.skipped += 1;
            }
            DispatchEvent::BatchPause => {
                self.batch_pauses += 1;
            }
        }
    }

    /// Number of items that reached a terminal disposition
    pub fn total_items(&self) -> usize {
        self.queued + self.executed + self.planned + self.submit_failures + self.skipped
    }

    /// One-line summary for the end-of-dispatch log
    pub fn summary(&self) -> String {
        format!(
            "{} queued, {} executed ({} failed), {} planned, {} skipped, {} batch pauses",
            self.queued,
            self.executed,
            self.exec_failures,
            self.planned,
            self.skipped,
            self.batch_pauses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate_by_event_kind() {
        let mut stats = DispatchStats::new();
        stats.update(&DispatchEvent::Queued);
        stats.update(&DispatchEvent::Queued);
        stats.update(&DispatchEvent::Executed { exit_ok: true });
        stats.update(&DispatchEvent::Executed { exit_ok: false });
        stats.update(&DispatchEvent::Planned);
        stats.update(&DispatchEvent::BatchPause);
        stats.update(&DispatchEvent::Skipped);

        assert_eq!(stats.queued, 2);
        assert_eq!(stats.executed, 2);
        assert_eq!(stats.exec_failures, 1);
        assert_eq!(stats.planned, 1);
        assert_eq!(stats.batch_pauses, 1);
        assert_eq!(stats.skipped, 1);
        // Batch pauses are not items
        assert_eq!(stats.total_items(), 6);
    }
}
