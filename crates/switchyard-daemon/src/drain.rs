//! Notification drain
//!
//! The single consumer of the engine's notification channel. Console lines
//! go to the log and, when enabled, to the remote group; activity records go
//! to the CSV activity log.

use chrono::Local;
use switchyard_engine::{ActivityLog, Notification, RemoteMessage};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::link::RemoteSender;

#[derive(Default)]
pub struct NotificationDrain {
    remote: Option<RemoteSender>,
    activity: Option<ActivityLog>,
}

impl NotificationDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward console lines to the remote group
    pub fn with_remote(mut self, sender: RemoteSender) -> Self {
        self.remote = Some(sender);
        self
    }

    /// Append activity records to `log`
    pub fn with_activity_log(mut self, log: ActivityLog) -> Self {
        self.activity = Some(log);
        self
    }

    /// Handle one notification
    pub async fn handle(&self, notification: Notification) {
        match notification {
            Notification::Console { at, text } => {
                info!(target: "switchyard::console", "{}", text);
                if let Some(remote) = &self.remote {
                    let stamped = format!("{} {}", at.with_timezone(&Local).format("%H:%M:%S"), text);
                    if let Err(e) = remote.send(&RemoteMessage::Console(stamped)).await {
                        warn!("Remote send failed: {}", e);
                    }
                }
            }
            Notification::MinerOutput(line) => {
                info!(target: "switchyard::miner", "{}", line);
            }
            Notification::Remote { from, body } => {
                info!(target: "switchyard::remote", %from, "{}", body);
            }
            Notification::Activity(record) => {
                if let Some(log) = &self.activity {
                    if let Err(e) = log.append(&record) {
                        warn!(path = %log.path().display(), "Activity log write failed: {}", e);
                    }
                }
            }
        }
    }

    /// Drain until every sender is dropped
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Notification>) {
        while let Some(notification) = rx.recv().await {
            self.handle(notification).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use switchyard_common::MiningMode;
    use switchyard_engine::{ActivityAction, ActivityNotifier, ActivityRecord};

    fn record(action: ActivityAction) -> ActivityRecord {
        ActivityRecord {
            at: Utc::now(),
            action,
            mode: MiningMode::Automatic,
            workload: None,
            exchange: dec!(500),
        }
    }

    #[tokio::test]
    async fn test_activity_records_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.csv");
        let drain = NotificationDrain::new().with_activity_log(ActivityLog::new(&path));

        let (notifier, rx) = ActivityNotifier::channel();
        notifier.console(Utc::now(), "Starting Alpha X11");
        notifier.activity(record(ActivityAction::Start));
        notifier.miner_output("accepted 1/1");
        notifier.activity(record(ActivityAction::Stop));
        drop(notifier);

        drain.run(rx).await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(",Start,"));
        assert!(lines[2].contains(",Stop,"));
    }

    #[tokio::test]
    async fn test_console_lines_are_sent_remotely() {
        let listener = tokio::net::UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let sender = RemoteSender::bind_to(listener.local_addr().unwrap())
            .await
            .unwrap();
        let drain = NotificationDrain::new().with_remote(sender);

        drain
            .handle(Notification::Console {
                at: Utc::now(),
                text: "Dead Alpha X11".to_string(),
            })
            .await;

        let mut buf = [0u8; 256];
        let (len, _) = listener.recv_from(&mut buf).await.unwrap();
        match RemoteMessage::decode(&buf[..len]) {
            Some(RemoteMessage::Console(body)) => {
                // HH:MM:SS prefix
                assert_eq!(body.len(), 8 + 1 + "Dead Alpha X11".len());
                assert!(body.ends_with(" Dead Alpha X11"));
            }
            None => panic!("undecodable datagram"),
        }
    }
}
