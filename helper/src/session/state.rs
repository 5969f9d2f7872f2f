//! Pure state machine for the session watcher.
//!
//! Kept free of any Win32 types so the transition rules can be unit-tested
//! on every platform. The window procedure translates the returned actions
//! into the actual OS calls.

use clap::ValueEnum;

/// Whether the helper blocks shutdown while the pipeline runs, or only
/// flags the event and shows a one-time notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchMode {
    Block,
    Notify,
}

impl std::fmt::Display for WatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match *self {
            WatchMode::Block => "block",
            WatchMode::Notify => "notify",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle of the watcher window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session-end notification handled yet.
    Idle,
    /// A block reason is registered and the pipeline worker is running.
    BlockActive,
    /// Destruction has begun; no further work is started.
    Closing,
}

/// What the window procedure must do in response to a session-end query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndSessionAction {
    /// Register a block reason, start the pipeline worker, and deny the query.
    BlockAndRunSequence,
    /// Allow the query; the one-time notice is now pending and must be
    /// shown outside the query handler.
    NoticeAndAllow,
    /// Nothing to start; keep denying while a block is active, allow otherwise.
    Ignore,
}

/// Watcher state threaded through the window procedure.
#[derive(Debug)]
pub struct SessionWatcher {
    mode: WatchMode,
    phase: SessionPhase,
    session_ending: bool,
    noticed: bool,
    notice_pending: bool,
}

impl SessionWatcher {
    pub fn new(mode: WatchMode) -> Self {
        Self {
            mode,
            phase: SessionPhase::Idle,
            session_ending: false,
            noticed: false,
            notice_pending: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// `true` once a session-end notification has been seen.
    pub fn session_ending(&self) -> bool {
        self.session_ending
    }

    /// Whether the shutdown-block reason is currently registered.
    pub fn block_active(&self) -> bool {
        matches!(self.phase, SessionPhase::BlockActive)
    }

    /// Takes the pending one-time notice.
    ///
    /// Returns `true` exactly once after a notify-mode query scheduled the
    /// notice. Displaying it is deliberately decoupled from the query
    /// handler, which must return without waiting on the user.
    pub fn take_pending_notice(&mut self) -> bool {
        std::mem::take(&mut self.notice_pending)
    }

    /// Handles a session-end query.
    ///
    /// The worker is started at most once: repeated queries while the
    /// pipeline runs keep blocking without spawning again. In notify mode
    /// the notice is shown only for the first query.
    pub fn on_end_session_query(&mut self) -> EndSessionAction {
        self.session_ending = true;
        match (self.mode, self.phase) {
            (WatchMode::Block, SessionPhase::Idle) => {
                self.phase = SessionPhase::BlockActive;
                EndSessionAction::BlockAndRunSequence
            }
            (WatchMode::Notify, SessionPhase::Idle) => {
                if self.noticed {
                    EndSessionAction::Ignore
                } else {
                    self.noticed = true;
                    self.notice_pending = true;
                    EndSessionAction::NoticeAndAllow
                }
            }
            _ => EndSessionAction::Ignore,
        }
    }

    /// Handles window destruction.
    ///
    /// Returns `true` when a block reason was active and must be cleared
    /// before the window goes away.
    pub fn on_destroy(&mut self) -> bool {
        let clear = self.block_active();
        self.phase = SessionPhase::Closing;
        clear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_mode_starts_the_worker_once() {
        let mut watcher = SessionWatcher::new(WatchMode::Block);
        assert_eq!(
            watcher.on_end_session_query(),
            EndSessionAction::BlockAndRunSequence
        );
        assert_eq!(watcher.phase(), SessionPhase::BlockActive);
        // A repeated query keeps blocking but must not spawn a second worker.
        assert_eq!(watcher.on_end_session_query(), EndSessionAction::Ignore);
        assert!(watcher.block_active());
    }

    #[test]
    fn notify_mode_notices_once_and_never_blocks() {
        let mut watcher = SessionWatcher::new(WatchMode::Notify);
        assert_eq!(
            watcher.on_end_session_query(),
            EndSessionAction::NoticeAndAllow
        );
        assert_eq!(watcher.phase(), SessionPhase::Idle);
        assert!(!watcher.block_active());
        assert_eq!(watcher.on_end_session_query(), EndSessionAction::Ignore);
        assert!(watcher.session_ending());
    }

    #[test]
    fn notice_is_deferred_and_taken_once() {
        let mut watcher = SessionWatcher::new(WatchMode::Notify);
        assert!(
            !watcher.take_pending_notice(),
            "nothing pending before a query"
        );
        watcher.on_end_session_query();
        assert!(watcher.take_pending_notice());
        assert!(!watcher.take_pending_notice(), "the notice is shown once");
        watcher.on_end_session_query();
        assert!(
            !watcher.take_pending_notice(),
            "repeated queries schedule nothing"
        );
    }

    #[test]
    fn block_mode_never_schedules_a_notice() {
        let mut watcher = SessionWatcher::new(WatchMode::Block);
        watcher.on_end_session_query();
        assert!(!watcher.take_pending_notice());
    }

    #[test]
    fn destroy_clears_an_active_block() {
        let mut watcher = SessionWatcher::new(WatchMode::Block);
        watcher.on_end_session_query();
        assert!(watcher.on_destroy(), "active block must be cleared");
        assert_eq!(watcher.phase(), SessionPhase::Closing);
    }

    #[test]
    fn destroy_without_block_needs_no_clear() {
        let mut watcher = SessionWatcher::new(WatchMode::Block);
        assert!(!watcher.on_destroy());
        assert_eq!(watcher.phase(), SessionPhase::Closing);

        let mut notify = SessionWatcher::new(WatchMode::Notify);
        notify.on_end_session_query();
        assert!(!notify.on_destroy());
    }

    #[test]
    fn no_work_starts_after_closing() {
        let mut watcher = SessionWatcher::new(WatchMode::Block);
        watcher.on_destroy();
        assert_eq!(watcher.on_end_session_query(), EndSessionAction::Ignore);
        assert_eq!(watcher.phase(), SessionPhase::Closing);
    }
}
