use tokio::sync::broadcast;

use crate::model::Ms;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    BookingConfirmed,
    BookingUpdated,
    BookingCancelled,
}

impl NoticeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NoticeKind::BookingConfirmed => "booking_confirmed",
            NoticeKind::BookingUpdated => "booking_updated",
            NoticeKind::BookingCancelled => "booking_cancelled",
        }
    }
}

/// The day details a notification template needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayContext {
    pub date: Ms,
    pub theme: String,
}

/// One outbound notification. Delivery is advisory: the reservation is the
/// durable fact, the notice is best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub recipient: String,
    pub day: DayContext,
}

/// Broadcast hub between the engine and whatever delivers mail. The engine
/// publishes after every committed mutation; publishing never fails it.
pub struct NotifyHub {
    tx: broadcast::Sender<Notice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Publish a notice. No-op if nobody is listening.
    pub fn send(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            tracing::debug!("notice dropped: no dispatcher subscribed");
        }
    }
}
