//! Hover sessions: a generation counter plus a CancellationToken per session.
//! Every async completion checks its guard before touching the element.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Session bookkeeping for one message element. Each hover-enter starts a
/// new session; hover-leave ends it. Ending or replacing a session cancels
/// its token and advances the generation.
pub struct HoverSessions {
    current_token: RwLock<CancellationToken>,
    generation: Arc<AtomicU64>,
}

impl Default for HoverSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl HoverSessions {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancel the previous session and start a new one.
    pub fn begin(&self) -> SessionGuard {
        let (token, generation) = self.cancel_and_advance();
        SessionGuard {
            generation: Arc::clone(&self.generation),
            my_generation: generation,
            token,
        }
    }

    /// Cancel the current session without starting another. Returns the new generation.
    pub fn end(&self) -> u64 {
        self.cancel_and_advance().1
    }

    fn cancel_and_advance(&self) -> (CancellationToken, u64) {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let new_root = CancellationToken::new();
        let child = new_root.child_token();
        *token_guard = new_root;
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (child, gen)
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Guard that a task checks before writing results.
/// If the generation has advanced past `my_generation`, the task is stale.
#[derive(Clone)]
pub struct SessionGuard {
    generation: Arc<AtomicU64>,
    my_generation: u64,
    token: CancellationToken,
}

impl SessionGuard {
    /// Returns true if this is still the active hover session.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.my_generation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Not cancelled and still current.
    #[inline]
    pub fn should_continue(&self) -> bool {
        !self.is_cancelled() && self.is_current()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn session(&self) -> u64 {
        self.my_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_invalidates_previous() {
        let sessions = HoverSessions::new();
        let first = sessions.begin();
        assert!(first.should_continue());

        let second = sessions.begin();
        assert!(first.is_cancelled());
        assert!(!first.is_current());
        assert!(second.should_continue());
        assert_eq!(second.session(), first.session() + 1);
    }

    #[test]
    fn end_cancels_without_new_session() {
        let sessions = HoverSessions::new();
        let guard = sessions.begin();
        let gen = sessions.end();
        assert_eq!(gen, sessions.current_generation());
        assert!(!guard.should_continue());
        assert!(guard.token().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_on_end() {
        let sessions = HoverSessions::new();
        let guard = sessions.begin();
        let waiter = tokio::spawn(async move { guard.token().cancelled().await });
        sessions.end();
        waiter.await.unwrap();
    }
}
