//! Process-wide status log queue, drained by any number of `/logs`
//! connections. Queue semantics, not broadcast: each message is delivered
//! to exactly one consumer, in FIFO order relative to a single producer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

#[derive(Debug, PartialEq)]
pub enum Consumed {
    Message(String),
    /// No message arrived within the timeout. Distinct from an error; the
    /// stream endpoint turns this into a keep-alive comment.
    TimedOut,
    /// All producers are gone.
    Closed,
}

#[derive(Clone)]
pub struct LogBroadcaster {
    tx: mpsc::UnboundedSender<String>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Append a message to the queue and mirror it to the operational log.
    pub fn publish(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        // Send only fails when the receiver is gone, which means no one is
        // left to read UI logs anyway.
        let _ = self.tx.send(message);
    }

    /// Block up to `timeout` for the next message. Consumers contend for
    /// the receiver; whoever holds it when a message arrives wins it.
    pub async fn consume(&self, timeout: Duration) -> Consumed {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(message)) => Consumed::Message(message),
            Ok(None) => Consumed::Closed,
            Err(_) => Consumed::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_come_out_in_fifo_order() {
        let logs = LogBroadcaster::new();
        logs.publish("first");
        logs.publish("second");
        logs.publish("third");

        for expected in ["first", "second", "third"] {
            match logs.consume(Duration::from_millis(100)).await {
                Consumed::Message(m) => assert_eq!(m, expected),
                other => panic!("expected message, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn empty_queue_signals_timeout_not_error() {
        let logs = LogBroadcaster::new();
        assert_eq!(
            logs.consume(Duration::from_millis(20)).await,
            Consumed::TimedOut
        );
    }

    #[tokio::test]
    async fn each_message_is_delivered_to_exactly_one_consumer() {
        let logs = LogBroadcaster::new();
        let total = 100usize;
        for i in 0..total {
            logs.publish(format!("msg-{i}"));
        }

        let drain = |logs: LogBroadcaster| async move {
            let mut seen = Vec::new();
            loop {
                match logs.consume(Duration::from_millis(50)).await {
                    Consumed::Message(m) => seen.push(m),
                    _ => break,
                }
            }
            seen
        };

        let (a, b) = tokio::join!(drain(logs.clone()), drain(logs.clone()));

        // Single delivery: no message appears on both consumers and the
        // union covers everything that was published.
        assert_eq!(a.len() + b.len(), total);
        let mut all: Vec<String> = a.iter().chain(b.iter()).cloned().collect();
        all.sort();
        let mut expected: Vec<String> = (0..total).map(|i| format!("msg-{i}")).collect();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn publishing_works_with_no_consumer_attached() {
        let logs = LogBroadcaster::new();
        logs.publish("buffered");
        // Consumed later, nothing was dropped.
        assert_eq!(
            logs.consume(Duration::from_millis(20)).await,
            Consumed::Message("buffered".to_string())
        );
    }
}
