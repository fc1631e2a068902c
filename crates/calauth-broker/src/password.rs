//! Lazy, de-duplicated acquisition of the token-encryption password.
//!
//! The password is asked for at most once per process lifetime: the first
//! caller opens the host's prompt, every concurrent caller awaits the same
//! resolution through a single-shot `watch` broadcast. This replaces the
//! busy-poll loop such stores usually grow and guarantees one prompt at a
//! time.
//!
//! The prompting caller can itself be cancelled mid-prompt (a host dropping
//! a timed-out operation). A drop guard hands the slot back to `Empty` in
//! that case, and a waiter that sees the broadcast die simply prompts again,
//! so a cancelled prompt never wedges the cache.

use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::host::Host;

/// The broadcast payload: outer `None` while the prompt is open, then
/// `Some(result)` where the inner `None` means the user dismissed it.
type PromptResult = Option<Option<String>>;

enum Slot {
    /// No password cached, no prompt outstanding.
    Empty,
    /// A prompt is open; waiters subscribe to this receiver.
    Pending(watch::Receiver<PromptResult>),
    /// The password for this process lifetime.
    Cached(String),
}

/// Process-scoped cache of the encryption password.
pub struct PasswordCache {
    slot: Mutex<Slot>,
}

enum Role {
    Prompt(watch::Sender<PromptResult>),
    Wait(watch::Receiver<PromptResult>),
}

/// Returns the slot to `Empty` if the prompting future is dropped before it
/// resolved, so later callers prompt again instead of waiting forever.
struct PromptGuard<'a> {
    cache: &'a PasswordCache,
    armed: bool,
}

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slot = self.cache.slot.lock().unwrap();
            if matches!(&*slot, Slot::Pending(_)) {
                *slot = Slot::Empty;
            }
        }
    }
}

impl PasswordCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Returns the cached password, prompting through the host if necessary.
    ///
    /// # Errors
    ///
    /// [`BrokerError::PasswordUnavailable`] when the user dismisses the
    /// prompt; the cache stays empty so a later call can ask again.
    pub async fn obtain(&self, host: &dyn Host) -> BrokerResult<String> {
        let role = {
            let mut slot = self.slot.lock().unwrap();
            match &*slot {
                Slot::Cached(password) => return Ok(password.clone()),
                Slot::Pending(rx) => Role::Wait(rx.clone()),
                Slot::Empty => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Slot::Pending(rx);
                    Role::Prompt(tx)
                }
            }
        };

        match role {
            Role::Prompt(tx) => {
                let mut guard = PromptGuard {
                    cache: self,
                    armed: true,
                };
                debug!("opening password prompt");
                let result = host.prompt_password().await;
                {
                    let mut slot = self.slot.lock().unwrap();
                    *slot = match &result {
                        Some(password) => Slot::Cached(password.clone()),
                        None => Slot::Empty,
                    };
                }
                guard.armed = false;
                let _ = tx.send(Some(result.clone()));
                result.ok_or(BrokerError::PasswordUnavailable)
            }
            Role::Wait(mut rx) => {
                // Clone out of the watch `Ref` before matching so the lock
                // guard is not held across the re-prompt await below.
                let resolved = rx
                    .wait_for(|value| value.is_some())
                    .await
                    .map(|resolved| resolved.clone());
                match resolved {
                    Ok(resolved) => {
                        resolved.flatten().ok_or(BrokerError::PasswordUnavailable)
                    }
                    // The prompter was cancelled and its guard emptied the
                    // slot; take over and prompt ourselves.
                    Err(_) => Box::pin(self.obtain(host)).await,
                }
            }
        }
    }

    /// Forgets the cached password (logout, settings change).
    ///
    /// An outstanding prompt is left to resolve; its waiters still get that
    /// resolution, but the value is not cached afterwards. A pending slot
    /// whose prompter is already gone is reset.
    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap();
        match &*slot {
            Slot::Cached(_) => *slot = Slot::Empty,
            Slot::Pending(rx) if rx.has_changed().is_err() => *slot = Slot::Empty,
            _ => {}
        }
    }
}

impl Default for PasswordCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::host::BoxFuture;

    /// Host whose prompt takes a while, to let callers pile up.
    struct SlowPromptHost {
        prompts: AtomicUsize,
        answer: Option<String>,
    }

    impl SlowPromptHost {
        fn answering(answer: &str) -> Self {
            Self {
                prompts: AtomicUsize::new(0),
                answer: Some(answer.to_string()),
            }
        }
    }

    impl Host for SlowPromptHost {
        fn navigate_to(&self, _url: &str) {}

        fn prompt_password(&self) -> BoxFuture<'_, Option<String>> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            let answer = self.answer.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                answer
            })
        }

        fn notify(&self, _message: &str) {}
    }

    /// Host whose prompt never resolves, standing in for a modal the user
    /// leaves open until the host gives up on the operation.
    struct HangingPromptHost {
        prompts: AtomicUsize,
    }

    impl Host for HangingPromptHost {
        fn navigate_to(&self, _url: &str) {}

        fn prompt_password(&self) -> BoxFuture<'_, Option<String>> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            Box::pin(std::future::pending())
        }

        fn notify(&self, _message: &str) {}
    }

    async fn yield_until(condition: impl Fn() -> bool) {
        while !condition() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_prompt() {
        let host = Arc::new(SlowPromptHost::answering("pw"));
        let cache = Arc::new(PasswordCache::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let host = Arc::clone(&host);
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(
                async move { cache.obtain(host.as_ref()).await },
            ));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "pw");
        }
        assert_eq!(host.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_password_skips_prompt() {
        let host = SlowPromptHost::answering("pw");
        let cache = PasswordCache::new();

        assert_eq!(cache.obtain(&host).await.unwrap(), "pw");
        assert_eq!(cache.obtain(&host).await.unwrap(), "pw");
        assert_eq!(host.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dismissed_prompt_is_not_cached() {
        let host = SlowPromptHost {
            prompts: AtomicUsize::new(0),
            answer: None,
        };
        let cache = PasswordCache::new();

        assert!(matches!(
            cache.obtain(&host).await,
            Err(BrokerError::PasswordUnavailable)
        ));
        // A second call prompts again instead of replaying the dismissal.
        assert!(cache.obtain(&host).await.is_err());
        assert_eq!(host.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_forces_a_new_prompt() {
        let host = SlowPromptHost::answering("pw");
        let cache = PasswordCache::new();

        cache.obtain(&host).await.unwrap();
        cache.clear();
        cache.obtain(&host).await.unwrap();
        assert_eq!(host.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_prompt_does_not_wedge_the_cache() {
        let hanging = Arc::new(HangingPromptHost {
            prompts: AtomicUsize::new(0),
        });
        let cache = Arc::new(PasswordCache::new());

        let prompter = tokio::spawn({
            let cache = Arc::clone(&cache);
            let hanging = Arc::clone(&hanging);
            async move { cache.obtain(hanging.as_ref()).await }
        });
        yield_until(|| hanging.prompts.load(Ordering::SeqCst) == 1).await;
        prompter.abort();
        let _ = prompter.await;

        // A fresh caller must get its own prompt, not an eternal wait.
        let host = SlowPromptHost::answering("pw");
        assert_eq!(cache.obtain(&host).await.unwrap(), "pw");
        assert_eq!(host.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiter_reprompts_after_prompter_cancellation() {
        let hanging = Arc::new(HangingPromptHost {
            prompts: AtomicUsize::new(0),
        });
        let responsive = Arc::new(SlowPromptHost::answering("pw"));
        let cache = Arc::new(PasswordCache::new());

        let prompter = tokio::spawn({
            let cache = Arc::clone(&cache);
            let hanging = Arc::clone(&hanging);
            async move { cache.obtain(hanging.as_ref()).await }
        });
        yield_until(|| hanging.prompts.load(Ordering::SeqCst) == 1).await;

        // Piles up behind the hanging prompt.
        let waiter = tokio::spawn({
            let cache = Arc::clone(&cache);
            let responsive = Arc::clone(&responsive);
            async move { cache.obtain(responsive.as_ref()).await }
        });
        tokio::task::yield_now().await;

        prompter.abort();
        let _ = prompter.await;

        // The orphaned waiter takes over the prompt itself.
        assert_eq!(waiter.await.unwrap().unwrap(), "pw");
        assert_eq!(responsive.prompts.load(Ordering::SeqCst), 1);
    }
}
