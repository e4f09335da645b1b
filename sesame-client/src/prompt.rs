//! Driving `org.freedesktop.Secret.Prompt` objects to completion.
//!
//! Operations that need the user's consent return a prompt path instead of a
//! result. The client calls `Prompt(window_id)` on it; the service shows its
//! dialog and later emits `Completed(dismissed, result)` on the same object.

use std::sync::Arc;
use std::time::Duration;

use sesame_core::{Error, Result, WindowIdProvider};
use tracing::{debug, warn};

use crate::bus::{Bus, PromptResult};
use crate::rpc;

/// A pending prompt. Driven once with [`Prompt::complete`], then discarded.
#[derive(Debug)]
pub struct Prompt {
    path: String,
}

impl Prompt {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Show the prompt and wait for the user's answer.
    ///
    /// A window id lookup failure aborts before anything is sent. A dismissed
    /// prompt is [`Error::PromptDismissed`]. On timeout the prompt is
    /// dismissed on the service side before [`Error::Timeout`] is returned.
    pub async fn complete(
        self,
        bus: &dyn Bus,
        window: Arc<dyn WindowIdProvider>,
        timeout: Option<Duration>,
    ) -> Result<PromptResult> {
        // The provider may shell out, keep it off the async executor.
        let window_id = tokio::task::spawn_blocking(move || window.active_window_id())
            .await
            .map_err(|e| Error::WindowId(format!("window id lookup panicked: {e}")))??;

        debug!(path = %self.path, window_id = %window_id, "completing prompt");
        let outcome = rpc::call_and_wait(bus, &self.path, timeout, move |prompt| async move {
            prompt.prompt(&window_id).await
        })
        .await;

        let completed = match outcome {
            Err(err @ Error::Timeout { .. }) => {
                self.dismiss(bus).await;
                return Err(err);
            }
            other => other?,
        };

        if completed.dismissed {
            debug!(path = %self.path, "prompt dismissed");
            return Err(Error::PromptDismissed);
        }
        Ok(completed.result)
    }

    async fn dismiss(&self, bus: &dyn Bus) {
        let dismissed = match bus.object(&self.path).await {
            Ok(prompt) => prompt.dismiss().await,
            Err(e) => Err(e),
        };
        if let Err(e) = dismissed {
            warn!(path = %self.path, error = %e, "failed to dismiss timed out prompt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBus, PromptBehavior};
    use sesame_core::window::FixedWindowId;

    const PROMPT: &str = "/org/freedesktop/secrets/prompt/u3";

    struct NoDisplay;

    impl WindowIdProvider for NoDisplay {
        fn active_window_id(&self) -> Result<String> {
            Err(Error::WindowId("no display".to_string()))
        }
    }

    fn window() -> Arc<dyn WindowIdProvider> {
        Arc::new(FixedWindowId("0x3a00007".to_string()))
    }

    #[tokio::test]
    async fn completed_prompt_returns_payload() {
        let bus = FakeBus::new();
        let path = "/org/freedesktop/secrets/collection/work".to_string();
        bus.add_prompt(PROMPT, PromptBehavior::Complete(PromptResult::Path(path.clone())));

        let result = Prompt::new(PROMPT).complete(&bus, window(), None).await.unwrap();

        assert_eq!(result, PromptResult::Path(path));
        assert!(bus.calls().contains(&format!("Prompt {PROMPT} 0x3a00007")));
    }

    #[tokio::test]
    async fn dismissed_prompt_is_an_error() {
        let bus = FakeBus::new();
        bus.add_prompt(PROMPT, PromptBehavior::Dismiss);

        let err = Prompt::new(PROMPT).complete(&bus, window(), None).await.unwrap_err();
        assert!(matches!(err, Error::PromptDismissed));
    }

    #[tokio::test]
    async fn window_id_failure_is_fatal_and_sends_nothing() {
        let bus = FakeBus::new();
        bus.add_prompt(PROMPT, PromptBehavior::Complete(PromptResult::Empty));

        let err = Prompt::new(PROMPT)
            .complete(&bus, Arc::new(NoDisplay), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WindowId(_)));
        assert!(bus.calls().is_empty());
    }

    #[tokio::test]
    async fn timeout_dismisses_the_prompt() {
        let bus = FakeBus::new();
        bus.add_prompt(PROMPT, PromptBehavior::Hang);

        let err = Prompt::new(PROMPT)
            .complete(&bus, window(), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(bus.calls().contains(&format!("Dismiss {PROMPT}")));
        assert_eq!(bus.live_subscriptions(), 0);
    }
}
