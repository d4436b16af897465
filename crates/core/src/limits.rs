//! Resource limits for hostile-input hardening.
//!
//! Decompression bombs hide behind stream filters: a few hundred bytes on
//! disk can inflate to gigabytes. The handler caps the size of a single
//! decompressed stream, the running sum across suspicious streams, and the
//! number of slots the xref table may grow to.

use crate::error::{PdfError, Result};
use std::collections::HashSet;
use std::sync::Mutex;

/// Default cap for one decompressed stream.
const DEFAULT_MAX_SINGLE_STREAM: usize = (i32::MAX / 100) as usize;

/// Default cap for the sum of suspicious decompressed streams.
const DEFAULT_MAX_STREAM_SUM: usize = (i32::MAX / 20) as usize;

/// Default cap on xref table capacity.
const DEFAULT_MAX_XREF_ELEMENTS: usize = 50_000_000;

type SuspicionPolicy = Box<dyn Fn(&[&str]) -> bool + Send + Sync>;

/// Policy object consulted while decoding streams and growing the xref table.
///
/// Byte counts for one stream are accumulated through a [`StreamScope`]:
/// provisional while the scope is open, committed to the running total only
/// on [`StreamScope::commit`]. A stream that fails mid-decode therefore does
/// not poison the total, but still fails fast against the single-stream cap.
pub struct MemoryLimitsAwareHandler {
    max_single_stream: usize,
    max_stream_sum: usize,
    max_xref_elements: usize,
    committed: Mutex<usize>,
    suspicion: Option<SuspicionPolicy>,
}

impl Default for MemoryLimitsAwareHandler {
    fn default() -> Self {
        Self {
            max_single_stream: DEFAULT_MAX_SINGLE_STREAM,
            max_stream_sum: DEFAULT_MAX_STREAM_SUM,
            max_xref_elements: DEFAULT_MAX_XREF_ELEMENTS,
            committed: Mutex::new(0),
            suspicion: None,
        }
    }
}

impl MemoryLimitsAwareHandler {
    /// Scale all limits from a total-memory budget in bytes.
    ///
    /// The single-stream cap is 100x the budget and the stream-sum cap is
    /// 500x, both saturating at `i32::MAX`. The xref cap scales down for
    /// small budgets and saturates at the default for large ones.
    pub fn with_budget(budget: usize) -> Self {
        let cap = i32::MAX as usize;
        Self {
            max_single_stream: cap.min(budget.saturating_mul(100)),
            max_stream_sum: cap.min(budget.saturating_mul(500)),
            max_xref_elements: DEFAULT_MAX_XREF_ELEMENTS.min(budget.saturating_mul(50)),
            committed: Mutex::new(0),
            suspicion: None,
        }
    }

    pub fn max_single_stream(&self) -> usize {
        self.max_single_stream
    }

    pub fn max_stream_sum(&self) -> usize {
        self.max_stream_sum
    }

    pub fn max_xref_elements(&self) -> usize {
        self.max_xref_elements
    }

    /// Replace the suspicion predicate used by
    /// [`is_accounting_required`](Self::is_accounting_required).
    pub fn set_suspicion_policy(
        &mut self,
        policy: impl Fn(&[&str]) -> bool + Send + Sync + 'static,
    ) {
        self.suspicion = Some(Box::new(policy));
    }

    /// Whether a filter chain must be accounted against the limits.
    ///
    /// The default policy flags a chain only when it contains two or more
    /// distinct filter kinds. Repeated application of one filter is common
    /// and benign; mixed chains are the decompression-bomb vector.
    pub fn is_accounting_required(&self, filter_names: &[&str]) -> bool {
        if let Some(policy) = &self.suspicion {
            return policy(filter_names);
        }
        if filter_names.len() < 2 {
            return false;
        }
        let distinct: HashSet<&&str> = filter_names.iter().collect();
        distinct.len() >= 2
    }

    /// Open an accounting scope for one logical decode unit.
    pub fn begin_stream_scope(&self) -> StreamScope<'_> {
        StreamScope {
            handler: self,
            occupied: 0,
        }
    }

    /// Check a requested xref table capacity against the ceiling.
    ///
    /// The table is 1-based with slot 0 reserved for the free-list
    /// sentinel, so the check discounts one slot.
    pub fn check_xref_capacity(&self, requested: usize) -> Result<()> {
        if requested.saturating_sub(1) > self.max_xref_elements {
            return Err(PdfError::XrefSizeExceeded {
                limit: self.max_xref_elements,
                requested,
            });
        }
        Ok(())
    }

    /// Bytes committed so far across completed suspicious streams.
    pub fn committed_bytes(&self) -> usize {
        *self.committed.lock().expect("limits mutex poisoned")
    }
}

/// Scoped accumulator for one stream's decompressed bytes.
///
/// Dropping the scope without calling [`commit`](Self::commit) discards the
/// provisional count.
pub struct StreamScope<'a> {
    handler: &'a MemoryLimitsAwareHandler,
    occupied: usize,
}

impl StreamScope<'_> {
    /// Account `n` more decompressed bytes within this scope.
    pub fn consider(&mut self, n: usize) -> Result<()> {
        self.occupied = self.occupied.saturating_add(n);
        if self.occupied > self.handler.max_single_stream {
            return Err(PdfError::SingleStreamLimitExceeded {
                limit: self.handler.max_single_stream,
                occupied: self.occupied,
            });
        }
        let committed = self.handler.committed_bytes();
        let total = committed.saturating_add(self.occupied);
        if total > self.handler.max_stream_sum {
            return Err(PdfError::StreamSumLimitExceeded {
                limit: self.handler.max_stream_sum,
                occupied: total,
            });
        }
        Ok(())
    }

    /// Fold the provisional count into the handler's running total.
    ///
    /// A scope dropped without commit never touches the total, so its
    /// provisional bytes are discarded with it.
    pub fn commit(self) {
        let mut committed = self
            .handler
            .committed
            .lock()
            .expect("limits mutex poisoned");
        *committed = committed.saturating_add(self.occupied);
    }
}
