//! Interrupt sources: Ctrl-C in the terminal, a channel in tests

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Resolves each time the user asks to stop
#[async_trait]
pub trait InterruptSource: Send {
    async fn interrupted(&mut self);
}

/// Ctrl-C via the process signal handler
#[derive(Debug, Default)]
pub struct CtrlC;

#[async_trait]
impl InterruptSource for CtrlC {
    async fn interrupted(&mut self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => debug!("Received Ctrl-C"),
            Err(e) => {
                error!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Interrupts delivered through an in-process channel
#[derive(Debug)]
pub struct ChannelInterrupt {
    rx: mpsc::UnboundedReceiver<()>,
}

impl ChannelInterrupt {
    pub fn channel() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl InterruptSource for ChannelInterrupt {
    async fn interrupted(&mut self) {
        if self.rx.recv().await.is_none() {
            // all senders gone: never fires again
            std::future::pending::<()>().await;
        }
    }
}

/// Never interrupts
#[derive(Debug, Default)]
pub struct NoInterrupt;

#[async_trait]
impl InterruptSource for NoInterrupt {
    async fn interrupted(&mut self) {
        std::future::pending::<()>().await;
    }
}
