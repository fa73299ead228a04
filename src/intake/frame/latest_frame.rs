use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Single-slot hand-off between the receiving and the processing task.
///
/// Publishing replaces whatever is pending, so the consumer always gets the
/// most recent frame and a slow consumer never builds a backlog.
#[derive(Debug)]
pub struct LatestFrameSlot<T> {
    state: Mutex<SlotState<T>>,
    notify: Notify,
}

#[derive(Debug)]
struct SlotState<T> {
    pending: Option<T>,
    closed: bool,
}

impl<T> LatestFrameSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Store `frame`, returning the pending frame it replaced.
    ///
    /// Frames published after `close` are discarded and handed back.
    pub fn publish(&self, frame: T) -> Option<T> {
        let replaced = {
            let mut state = self.lock();
            if state.closed {
                return Some(frame);
            }
            state.pending.replace(frame)
        };
        self.notify.notify_one();
        replaced
    }

    /// Wait for the next frame. Returns `None` once the slot is closed;
    /// a frame still pending at that point is discarded.
    pub async fn next(&self) -> Option<T> {
        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    state.pending = None;
                    return None;
                }
                if let Some(frame) = state.pending.take() {
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for LatestFrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
