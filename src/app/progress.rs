//! Progress event types
//!
//! Transfers and addon pipelines report progress as typed events over
//! explicit channels, so ordering and backpressure are part of the contract
//! rather than a side effect of callback timing.

/// Byte-level progress of a single transfer.
///
/// One preflight event (carrying the total) precedes the chunk events;
/// `bytes_received` is cumulative and non-decreasing; the last chunk event
/// carries `finished = true` once the cumulative count reaches the total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub url: String,
    pub preflight: bool,
    pub bytes_received: u64,
    pub bytes_total: u64,
    pub finished: bool,
}

/// Phase of a single addon pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonState {
    /// Cache hit detected, no network transfer will happen
    NoTransferNeeded,
    /// Download in flight, percent carries byte-level progress
    Downloading,
    /// Download finished (the addon counted as "updated")
    DownloadComplete,
    /// Archive restored from the version cache blob store
    ReusedFromCache,
    /// Archive extracted into the target directory (terminal)
    ExtractComplete,
}

/// Progress of a single addon pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonProgress {
    pub state: AddonState,
    pub addon: String,
    pub percent: u8,
}

impl AddonProgress {
    pub fn new(state: AddonState, addon: impl Into<String>, percent: u8) -> Self {
        Self {
            state,
            addon: addon.into(),
            percent,
        }
    }
}

/// Convert a received/total byte pair into a rounded percentage.
///
/// Capped at 100; a zero or nonsensical total yields 0 instead of failing.
pub fn percent_of(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let exact = received as f64 / total as f64 * 100.0;
    if !exact.is_finite() {
        return 0;
    }
    (exact.round() as u64).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of_rounds_and_caps() {
        assert_eq!(percent_of(0, 200), 0);
        assert_eq!(percent_of(50, 200), 25);
        assert_eq!(percent_of(199, 200), 100); // 99.5 rounds up
        assert_eq!(percent_of(200, 200), 100);
        assert_eq!(percent_of(400, 200), 100); // capped
    }

    #[test]
    fn test_percent_of_zero_total_yields_zero() {
        assert_eq!(percent_of(0, 0), 0);
        assert_eq!(percent_of(123, 0), 0);
    }
}
