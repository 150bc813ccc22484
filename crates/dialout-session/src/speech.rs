//! Handles to in-flight agent speech.

use tokio::sync::watch;

/// A handle to one utterance being played into the room.
///
/// Cloneable; any holder can wait for playout to finish. Actions that
/// would disconnect the agent (hangup, transfer) drain the current
/// utterance through this handle first, so speech is never truncated.
#[derive(Debug, Clone)]
pub struct SpeechHandle {
    text: String,
    done: watch::Receiver<bool>,
}

impl SpeechHandle {
    /// Creates a handle and the sender that marks playout complete.
    pub(crate) fn new(text: String) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { text, done: rx }, tx)
    }

    /// The text being spoken.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True once playout has finished.
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Waits until the utterance has finished playing. Returns
    /// immediately if playout already completed. A torn-down session
    /// counts as finished — callers must not hang on a dead channel.
    pub async fn wait_for_playout(&self) {
        let mut done = self.done.clone();
        loop {
            if *done.borrow() {
                return;
            }
            if done.changed().await.is_err() {
                return;
            }
        }
    }
}
