use std::time::{Duration, Instant};

pub const COMMIT_DEBOUNCE: Duration = Duration::from_millis(80);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommitDecision {
    /// Nothing was committed yet in this load: commit right away.
    Now,
    /// A trailing commit was scheduled for the end of the window.
    Scheduled,
    /// A trailing commit is already pending and absorbs this request.
    Coalesced,
}

/// Leading-edge commit followed by at most one trailing commit per window.
#[derive(Clone, Debug)]
pub struct CommitDebounce {
    window: Duration,
    committed_once: bool,
    due_at: Option<Instant>,
}

impl Default for CommitDebounce {
    fn default() -> Self {
        Self::new(COMMIT_DEBOUNCE)
    }
}

impl CommitDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            committed_once: false,
            due_at: None,
        }
    }

    pub fn request(&mut self, now: Instant) -> CommitDecision {
        if !self.committed_once {
            self.committed_once = true;
            return CommitDecision::Now;
        }
        if self.due_at.is_some() {
            return CommitDecision::Coalesced;
        }
        self.due_at = Some(now + self.window);
        CommitDecision::Scheduled
    }

    /// True once the pending trailing commit is due; the pending slot is cleared.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.due_at {
            Some(due) if now >= due => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }

    /// Drops any pending trailing commit; the caller commits unconditionally.
    pub fn flush(&mut self) {
        self.committed_once = true;
        self.due_at = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.due_at
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }
}

/// At most one pending run per frame; repeated requests fold into it.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameCoalescer {
    requested: bool,
}

impl FrameCoalescer {
    pub fn request(&mut self) {
        self.requested = true;
    }

    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.requested)
    }
}
