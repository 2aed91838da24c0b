use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

/// Human-readable booking notice, published after the owning commit has been
/// durably flushed. Delivery is best-effort: nothing here can fail a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub venue_id: Ulid,
    pub booking_id: Ulid,
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeKind {
    Approved,
    Cancelled,
}

/// Broadcast hub for per-venue booking notices. The embedding application
/// subscribes and forwards to its own notification/email delivery.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notice>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Subscribe to notices for a venue. Creates the channel if needed.
    pub fn subscribe(&self, venue_id: Ulid) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(venue_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a notice. No-op if nobody is listening; a lagging or closed
    /// receiver is logged and ignored.
    pub fn send(&self, notice: Notice) {
        if let Some(sender) = self.channels.get(&notice.venue_id)
            && sender.send(notice).is_err() {
                tracing::debug!("notice dropped: no live subscribers");
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(venue_id: Ulid) -> Notice {
        Notice {
            venue_id,
            booking_id: Ulid::new(),
            kind: NoticeKind::Cancelled,
            message: "booking cancelled".into(),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let vid = Ulid::new();
        let mut rx = hub.subscribe(vid);

        let n = notice(vid);
        hub.send(n.clone());

        assert_eq!(rx.recv().await.unwrap(), n);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(notice(Ulid::new())); // must not panic or block
    }
}
