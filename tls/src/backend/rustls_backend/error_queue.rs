//! Per-thread queue of backend error codes
//!
//! Mirrors the OpenSSL error queue: failures are appended in order, readers pop the
//! oldest entry, and the queue holds at most [`QUEUE_CAPACITY`] entries, dropping the
//! oldest when full.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::{BackendError, ErrorCode};

const QUEUE_CAPACITY: usize = 16;

thread_local! {
    static ERRORS: RefCell<VecDeque<ErrorCode>> = const { RefCell::new(VecDeque::new()) };
}

pub(super) fn push(code: ErrorCode) {
    if code.is_none() {
        return;
    }
    ERRORS.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.len() == QUEUE_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(code);
    });
}

/// Queue `err` and hand it back, for use in `map_err`
pub(super) fn record(err: BackendError) -> BackendError {
    tracing::debug!("Backend error {}: {}", err.code, err.message);
    push(err.code);
    err
}

pub(super) fn pop() -> ErrorCode {
    ERRORS.with(|queue| queue.borrow_mut().pop_front().unwrap_or(ErrorCode::NONE))
}

pub(super) fn peek() -> ErrorCode {
    ERRORS.with(|queue| queue.borrow().front().copied().unwrap_or(ErrorCode::NONE))
}

/// Free the queue's storage; the next push reallocates
pub(super) fn clear() {
    ERRORS.with(|queue| *queue.borrow_mut() = VecDeque::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReason;
    use proptest::prelude::*;

    #[test]
    fn pops_in_arrival_order() {
        clear();
        push(ErrorReason::AlertReceived.code());
        push(ErrorReason::UnknownIssuer.code());

        assert_eq!(peek(), ErrorReason::AlertReceived.code());
        assert_eq!(pop(), ErrorReason::AlertReceived.code());
        assert_eq!(pop(), ErrorReason::UnknownIssuer.code());
        assert_eq!(pop(), ErrorCode::NONE);
    }

    #[test]
    fn drops_oldest_when_full() {
        clear();
        push(ErrorReason::BrokenPipe.code());
        for _ in 0..QUEUE_CAPACITY {
            push(ErrorReason::TimedOut.code());
        }
        assert_eq!(peek(), ErrorReason::TimedOut.code());
        clear();
    }

    #[test]
    fn queues_are_per_thread() {
        clear();
        push(ErrorReason::DecryptFailed.code());
        let other = std::thread::spawn(peek).join().expect("thread");
        assert_eq!(other, ErrorCode::NONE);
        assert_eq!(pop(), ErrorReason::DecryptFailed.code());
    }

    #[test]
    fn clear_is_idempotent() {
        clear();
        clear();
        assert_eq!(peek(), ErrorCode::NONE);
    }

    proptest! {
        /// The queue keeps the newest non-zero codes, oldest first
        #[test]
        fn prop_keeps_newest_codes(raw in prop::collection::vec(0u64..8, 0..40)) {
            clear();
            for &code in &raw {
                push(ErrorCode::from_raw(code));
            }

            let pushed: Vec<u64> = raw.iter().copied().filter(|&code| code != 0).collect();
            let expected = &pushed[pushed.len().saturating_sub(QUEUE_CAPACITY)..];
            let mut drained = Vec::new();
            loop {
                let code = pop();
                if code.is_none() {
                    break;
                }
                drained.push(code.raw());
            }
            prop_assert_eq!(drained.as_slice(), expected);
        }
    }
}
