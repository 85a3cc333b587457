//! An in-memory [`DuplexStream`] pair for exercising `MessageSocket` and
//! higher layers without a real network, grounded on the teacher's
//! in-memory test transport pattern.

use async_trait::async_trait;
use hostbridge_socket_traits::{DuplexStream, SocketError, SocketResult};
use tokio::sync::Mutex;
use tokio::sync::mpsc;

/// One end of an in-memory duplex pair. Build with [`pair`].
pub struct MockDuplexStream {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
}

/// Construct two ends of an in-memory duplex connection; text sent on one
/// is received on the other. Closing (or dropping) one end causes the
/// other's `recv_text` to resolve to `None` once its backlog drains.
#[must_use]
pub fn pair() -> (MockDuplexStream, MockDuplexStream) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    (
        MockDuplexStream {
            tx: Mutex::new(Some(tx_a)),
            rx: Mutex::new(rx_b),
        },
        MockDuplexStream {
            tx: Mutex::new(Some(tx_b)),
            rx: Mutex::new(rx_a),
        },
    )
}

#[async_trait]
impl DuplexStream for MockDuplexStream {
    async fn send_text(&self, text: String) -> SocketResult<()> {
        match self.tx.lock().await.as_ref() {
            Some(tx) => tx.send(text).map_err(|_| SocketError::NotConnected),
            None => Err(SocketError::NotConnected),
        }
    }

    async fn recv_text(&self) -> SocketResult<Option<String>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> SocketResult<()> {
        self.tx.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_text_in_both_directions() {
        let (a, b) = pair();
        a.send_text("hello".to_string()).await.unwrap();
        assert_eq!(b.recv_text().await.unwrap(), Some("hello".to_string()));

        b.send_text("world".to_string()).await.unwrap();
        assert_eq!(a.recv_text().await.unwrap(), Some("world".to_string()));
    }

    #[tokio::test]
    async fn dropping_one_end_yields_none_on_the_other() {
        let (a, b) = pair();
        drop(a);
        assert_eq!(b.recv_text().await.unwrap(), None);
    }
}
