use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::notify::{Notice, NotifyHub};
use crate::observability;
use crate::store::MemoryStore;

#[derive(Debug)]
pub enum MailerError {
    Rejected(String),
}

impl std::fmt::Display for MailerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailerError::Rejected(reason) => write!(f, "delivery rejected: {reason}"),
        }
    }
}

impl std::error::Error for MailerError {}

/// Outbound delivery boundary. Implementations render and send the actual
/// mail; the engine never sees their failures.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<(), MailerError>;
}

/// Renders notices into the log instead of sending. The dry-run mailer.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, notice: &Notice) -> Result<(), MailerError> {
        info!(
            kind = notice.kind.label(),
            recipient = %notice.recipient,
            theme = %notice.day.theme,
            "notice (dry run)"
        );
        Ok(())
    }
}

/// Background task: drains the notify hub into the mailer. Delivery failure
/// is logged and counted, never surfaced: the reservation already stands.
pub async fn run_mailer(hub: Arc<NotifyHub>, mailer: Arc<dyn Mailer>) {
    let mut rx = hub.subscribe();
    loop {
        match rx.recv().await {
            Ok(notice) => match mailer.deliver(&notice).await {
                Ok(()) => {
                    metrics::counter!(
                        observability::NOTICES_DELIVERED_TOTAL,
                        "kind" => notice.kind.label()
                    )
                    .increment(1);
                    debug!(recipient = %notice.recipient, "notice delivered");
                }
                Err(e) => {
                    metrics::counter!(
                        observability::NOTICE_FAILURES_TOTAL,
                        "kind" => notice.kind.label()
                    )
                    .increment(1);
                    warn!(recipient = %notice.recipient, "notice delivery failed: {e}");
                }
            },
            Err(RecvError::Lagged(n)) => {
                warn!("mail dispatcher lagged, {n} notices dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Background task: rewrites the store journal once enough appends pile up.
pub async fn run_compactor(store: Arc<MemoryStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = store.appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact().await {
            Ok(()) => info!("journal compacted after {appends} appends"),
            Err(e) => warn!("journal compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{DayContext, NoticeKind};
    use tokio::sync::mpsc;

    fn notice(recipient: &str) -> Notice {
        Notice {
            kind: NoticeKind::BookingConfirmed,
            recipient: recipient.into(),
            day: DayContext {
                date: 1_730_592_000_000,
                theme: "Mediterranean Night".into(),
            },
        }
    }

    struct CollectingMailer {
        tx: mpsc::UnboundedSender<Notice>,
        /// Recipients this mailer bounces.
        reject: String,
    }

    #[async_trait]
    impl Mailer for CollectingMailer {
        async fn deliver(&self, notice: &Notice) -> Result<(), MailerError> {
            if notice.recipient == self.reject {
                return Err(MailerError::Rejected("mailbox full".into()));
            }
            self.tx.send(notice.clone()).unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatcher_forwards_notices() {
        let hub = Arc::new(NotifyHub::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mailer = Arc::new(CollectingMailer {
            tx,
            reject: String::new(),
        });
        tokio::spawn(run_mailer(hub.clone(), mailer));
        tokio::task::yield_now().await;

        hub.send(notice("one@example.com"));
        assert_eq!(rx.recv().await.unwrap().recipient, "one@example.com");
    }

    #[tokio::test]
    async fn dispatcher_survives_delivery_failure() {
        let hub = Arc::new(NotifyHub::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mailer = Arc::new(CollectingMailer {
            tx,
            reject: "bounce@example.com".into(),
        });
        tokio::spawn(run_mailer(hub.clone(), mailer));
        tokio::task::yield_now().await;

        hub.send(notice("bounce@example.com"));
        hub.send(notice("fine@example.com"));

        // The failed delivery is swallowed; the next one still arrives.
        assert_eq!(rx.recv().await.unwrap().recipient, "fine@example.com");
    }

    #[test]
    fn log_mailer_always_succeeds() {
        let delivered =
            tokio_test::block_on(LogMailer.deliver(&notice("anyone@example.com")));
        assert!(delivered.is_ok());
    }
}
