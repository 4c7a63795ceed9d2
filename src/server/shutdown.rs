use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Create a linked pair. The server stops when the handle is triggered or dropped.
pub fn shutdown_signal() -> (RpcServerShutdownHandle, RpcServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (RpcServerShutdownHandle { tx }, RpcServerShutdownSignal { rx })
}

pub struct RpcServerShutdownHandle {
    tx: oneshot::Sender<()>,
}

impl RpcServerShutdownHandle {
    pub fn shutdown(self) {
        let _ = self.tx.send(());
    }
}

pub struct RpcServerShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for RpcServerShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = Pin::new(&mut self.rx);

        match rx.poll(cx) {
            Poll::Pending => Poll::Pending,
            // Sent or dropped, either way we're done.
            Poll::Ready(_) => Poll::Ready(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[tokio::test]
    async fn fires_on_shutdown_or_drop() {
        let (handle, signal) = shutdown_signal();
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), signal).await.unwrap();

        let (handle, signal) = shutdown_signal();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), signal).await.unwrap();

        let (_handle, signal) = shutdown_signal();
        assert!(tokio::time::timeout(Duration::from_millis(20), signal).await.is_err());
    }
}
