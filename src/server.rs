//! Cooperative driver for a [`Context`].
use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::sleep;

use crate::context::Context;
use crate::error::Result;

enum Wake {
    Frame(Result<()>),
    Timer,
}

async fn wait_for(deadline: Option<Duration>) {
    match deadline {
        Some(wait) => sleep(wait).await,
        None => std::future::pending().await,
    }
}

impl Context {
    /// Waits for the next inbound frame or retransmission deadline and
    /// handles whichever comes first.
    pub async fn step(&mut self) -> Result<()> {
        let deadline = self.next_retransmission();
        let wake = tokio::select! {
            received = self.read() => Wake::Frame(received),
            _ = wait_for(deadline) => Wake::Timer,
        };

        match wake {
            Wake::Frame(received) => {
                received?;
                self.dispatch().await
            }
            Wake::Timer => {
                let handled = self.retransmit_due().await?;
                debug!("handled {} due transactions", handled);
                Ok(())
            }
        }
    }

    /// Drives the context until `shutdown` completes or a transport error occurs.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("shutting down {} context", self.kind);
                    return Ok(());
                }
                stepped = self.step() => stepped?,
            }
        }
    }
}
