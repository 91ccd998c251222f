//! Progress cadence and the observer seam used by long-running operations.
//!
//! Observers are advisory. Every operation that accepts one behaves the same
//! when it is `None`.

use crate::models::ProgressPhase;

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub current: usize,
    pub total: usize,
    pub label: String,
}

/// Receives progress notifications
#[cfg_attr(test, mockall::automock)]
pub trait ProgressObserver {
    fn notify(&self, update: &ProgressUpdate);
}

/// Update step for a run of `total` items: `10^(max(0, digits(total) - 2))`.
pub fn progress_step(total: usize) -> usize {
    let digits = decimal_digits(total);
    10usize.pow(digits.saturating_sub(2))
}

/// True on the first item, the last item and every `progress_step(total)`th item.
///
/// `index` is 1-based.
pub fn should_report(index: usize, total: usize) -> bool {
    index == 1 || index == total || index % progress_step(total) == 0
}

fn decimal_digits(mut n: usize) -> u32 {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Reports an item to `observer` when the cadence allows it
pub fn report(
    observer: Option<&dyn ProgressObserver>,
    phase: ProgressPhase,
    index: usize,
    total: usize,
    label: impl FnOnce() -> String,
) {
    let Some(observer) = observer else {
        return;
    };
    if should_report(index, total) {
        observer.notify(&ProgressUpdate {
            phase,
            current: index,
            total,
            label: label(),
        });
    }
}
