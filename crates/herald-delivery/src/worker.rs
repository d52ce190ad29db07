//! Email worker loop: consumes the email topic and processes each message
//! in its own task.
//!
//! Messages are acknowledged after processing completes, terminal or
//! skipped, giving at-least-once semantics: a crash between send and ack
//! redelivers the job. No ordering is guaranteed across notifications;
//! jobs sharing a `notification_id` arrive in publish order from the topic.

use std::sync::Arc;

use futures::StreamExt;
use herald_queue::QueueConsumer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::processor::EmailProcessor;

/// Long-running consumer for the email topic.
pub struct EmailWorker {
    consumer: Arc<QueueConsumer>,
    processor: Arc<EmailProcessor>,
    cancel: CancellationToken,
}

impl EmailWorker {
    /// Creates a worker over an established consumer.
    pub fn new(
        consumer: Arc<QueueConsumer>,
        processor: Arc<EmailProcessor>,
        cancel: CancellationToken,
    ) -> Self {
        Self { consumer, processor, cancel }
    }

    /// Runs the consume loop until cancelled or the stream closes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the message stream cannot be opened; per
    /// message failures are contained and logged.
    pub async fn run(&self) -> herald_queue::Result<()> {
        let mut stream = self.consumer.stream().await?;

        info!(topic = %self.consumer.topic(), "email worker consuming");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("email worker received shutdown signal");
                    break;
                },
                delivery = stream.next() => {
                    match delivery {
                        Some(Ok(delivery)) => self.dispatch(delivery),
                        Some(Err(err)) => {
                            error!(error = %err, "failed to read message from topic");
                        },
                        None => {
                            warn!("consumer stream closed, stopping worker");
                            break;
                        },
                    }
                },
            }
        }

        info!("email worker stopped");
        Ok(())
    }

    /// Spawns one task per message; the message is acknowledged after
    /// processing regardless of outcome, since terminal failures have
    /// already been reported upstream.
    fn dispatch(&self, delivery: lapin::message::Delivery) {
        let processor = self.processor.clone();
        let consumer = self.consumer.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let delivery_tag = delivery.delivery_tag;
            let outcome = processor.process(&cancel, &delivery.data).await;

            if let Err(err) = consumer.ack(delivery_tag).await {
                error!(
                    delivery_tag,
                    outcome = ?outcome,
                    error = %err,
                    "failed to acknowledge message"
                );
            }
        });
    }
}
