use std::{cell::RefCell, fmt};

/// One-shot work handed to the host scheduler. It receives the id of the
/// request that is running, so a loop can tell a stale request from its
/// live one.
pub type FrameRequestCallback = Box<dyn FnOnce(FrameRequestId)>;

/// Handle returned by [`FrameScheduler::request_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(pub u64);

/// Host per-frame primitive: run a callback once, before the next display
/// update. Callers that want a loop must request again from inside the
/// callback.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameRequestCallback) -> FrameRequestId;

    /// Drops a pending request. Returns `false` when it already ran or was
    /// never issued.
    fn cancel_frame(&self, id: FrameRequestId) -> bool;
}

/// State of a self-rescheduling loop driven through a [`FrameScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Scheduled(FrameRequestId),
    Cancelled,
}

impl LoopState {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    /// Whether `id` is the request this loop is waiting on. Requests that
    /// were already taken by the host when the loop was cancelled or
    /// restarted fail this check.
    pub fn is_live(&self, id: FrameRequestId) -> bool {
        *self == Self::Scheduled(id)
    }

    /// Cancels a pending request, if any, and marks the loop cancelled.
    pub fn cancel(&mut self, scheduler: &dyn FrameScheduler) {
        if let Self::Scheduled(id) = *self {
            scheduler.cancel_frame(id);
        }
        *self = Self::Cancelled;
    }
}

/// Scheduler whose frames are pumped explicitly with [`run_frame`].
///
/// Used by tests and by hosts that pace frames themselves (the command line
/// app sleeps between frames).
///
/// [`run_frame`]: ManualFrameScheduler::run_frame
#[derive(Default)]
pub struct ManualFrameScheduler {
    inner: RefCell<SchedulerQueue>,
}

#[derive(Default)]
struct SchedulerQueue {
    next_id: u64,
    pending: Vec<(FrameRequestId, FrameRequestCallback)>,
}

impl ManualFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    /// Runs every request queued before this call, in request order.
    /// Requests made while the frame runs are deferred to the next frame.
    /// Returns how many callbacks ran.
    pub fn run_frame(&self) -> usize {
        let due = std::mem::take(&mut self.inner.borrow_mut().pending);
        let count = due.len();
        for (id, callback) in due {
            callback(id);
        }
        count
    }

    /// Runs `frames` frames back to back.
    pub fn run_frames(&self, frames: usize) -> usize {
        (0..frames).map(|_| self.run_frame()).sum()
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn request_frame(&self, callback: FrameRequestCallback) -> FrameRequestId {
        let mut queue = self.inner.borrow_mut();
        queue.next_id += 1;
        let id = FrameRequestId(queue.next_id);
        queue.pending.push((id, callback));
        id
    }

    fn cancel_frame(&self, id: FrameRequestId) -> bool {
        let mut queue = self.inner.borrow_mut();
        let before = queue.pending.len();
        queue.pending.retain(|(pending, _)| *pending != id);
        queue.pending.len() != before
    }
}

impl fmt::Debug for ManualFrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualFrameScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    #[test]
    fn requests_made_during_a_frame_wait_for_the_next_one() {
        let scheduler = Rc::new(ManualFrameScheduler::new());
        let runs = Rc::new(Cell::new(0));

        let inner_runs = runs.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.request_frame(Box::new(move |_| {
            inner_runs.set(inner_runs.get() + 1);
            let again = inner_runs.clone();
            inner_scheduler.request_frame(Box::new(move |_| again.set(again.get() + 1)));
        }));

        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(runs.get(), 1);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn callbacks_receive_their_own_request_id() {
        let scheduler = ManualFrameScheduler::new();
        let seen = Rc::new(Cell::new(None));
        let sink = seen.clone();

        let id = scheduler.request_frame(Box::new(move |id| sink.set(Some(id))));
        scheduler.run_frame();
        assert_eq!(seen.get(), Some(id));
    }

    #[test]
    fn cancelled_requests_never_run() {
        let scheduler = ManualFrameScheduler::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();

        let id = scheduler.request_frame(Box::new(move |_| flag.set(true)));
        assert!(scheduler.cancel_frame(id));
        assert!(!scheduler.cancel_frame(id));

        assert_eq!(scheduler.run_frame(), 0);
        assert!(!ran.get());
    }

    #[test]
    fn loop_state_cancel_drops_the_pending_request() {
        let scheduler = ManualFrameScheduler::new();
        let id = scheduler.request_frame(Box::new(|_| {}));
        let mut state = LoopState::Scheduled(id);
        assert!(state.is_live(id));

        state.cancel(&scheduler);
        assert!(!state.is_live(id));
        assert_eq!(state, LoopState::Cancelled);
        assert_eq!(scheduler.pending(), 0);
    }
}
