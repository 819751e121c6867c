//! Activity notification channel
//!
//! The engine and supervisor never block on observers. Everything they want
//! to report is pushed onto an unbounded channel and drained by the host.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::activity::ActivityRecord;

/// Event pushed to observers
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Engine status line
    Console { at: DateTime<Utc>, text: String },
    /// One line of captured process output
    MinerOutput(String),
    /// Console line received from a peer
    Remote { from: IpAddr, body: String },
    /// Row for the activity log
    Activity(ActivityRecord),
}

/// Fire-and-forget sender; a dropped receiver silently disables it
#[derive(Debug, Clone, Default)]
pub struct ActivityNotifier {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl ActivityNotifier {
    /// Create a notifier and the receiver the host drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Notifier that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    fn send(&self, notification: Notification) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(notification);
        }
    }

    pub fn console(&self, at: DateTime<Utc>, text: impl Into<String>) {
        self.send(Notification::Console {
            at,
            text: text.into(),
        });
    }

    pub fn miner_output(&self, line: impl Into<String>) {
        self.send(Notification::MinerOutput(line.into()));
    }

    pub fn remote(&self, from: IpAddr, body: impl Into<String>) {
        self.send(Notification::Remote {
            from,
            body: body.into(),
        });
    }

    pub fn activity(&self, record: ActivityRecord) {
        self.send(Notification::Activity(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivers_in_order() {
        let (notifier, mut rx) = ActivityNotifier::channel();
        let now = Utc::now();
        notifier.console(now, "Starting");
        notifier.miner_output("accepted 1/1");

        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::Console {
                at: now,
                text: "Starting".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::MinerOutput("accepted 1/1".to_string())
        );
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (notifier, rx) = ActivityNotifier::channel();
        drop(rx);
        notifier.console(Utc::now(), "nobody listening");
        ActivityNotifier::disabled().miner_output("discarded");
    }
}
