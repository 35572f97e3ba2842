//! Correlation queue for outstanding dial attempts.
//!
//! A placed call enters the queue; every tick the queue is checked against
//! the platform's active-call snapshot. Present → a `MatchResult` is
//! emitted and the entry stays. Absent → the call has ended on the platform
//! side, the entry is dropped, and no result is emitted: the absence itself
//! is what the reconciler consumes.

use dialcast_core::types::{ActiveCallRecord, CorrelationEntry, MatchResult};

#[derive(Default)]
pub struct ActiveCallTracker {
    entries: Vec<CorrelationEntry>,
}

impl ActiveCallTracker {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, entry: CorrelationEntry) {
        tracing::debug!(
            project = %entry.project_id,
            callid = entry.platform_call_id,
            "correlation entry queued"
        );
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Match every queued entry against a fresh snapshot. Unmatched entries
    /// are removed.
    pub fn match_snapshot(&mut self, snapshot: &[ActiveCallRecord]) -> Vec<MatchResult> {
        let mut results = Vec::new();
        self.entries.retain(|entry| {
            match snapshot.iter().find(|call| call.id == entry.platform_call_id) {
                Some(call) => {
                    results.push(MatchResult {
                        request_id: entry.request_id,
                        phone: entry.phone.clone(),
                        project_id: entry.project_id.clone(),
                        customer_id: entry.customer_id.clone(),
                        call_flow_id: entry.call_flow_id.clone(),
                        active_call: call.clone(),
                    });
                    true
                }
                None => {
                    tracing::debug!(
                        project = %entry.project_id,
                        callid = entry.platform_call_id,
                        "call left the platform snapshot, dropping entry"
                    );
                    false
                }
            }
        });
        results
    }
}
