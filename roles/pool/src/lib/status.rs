//! ## Pool Status Reporting
//!
//! Long-lived tasks report to the main status loop through a channel. Each sender is tagged with
//! a [`Sender`] variant so the loop knows which component an update came from and whether the
//! pool can keep running.

use super::error::PoolError;

/// Each sending side of the status channel is wrapped with this enum so the main loop knows
/// which component sent the message.
#[derive(Debug, Clone)]
pub enum Sender {
    DownstreamListener(async_channel::Sender<Status>),
    TemplateReceiver(async_channel::Sender<Status>),
    BlockSubmitter(async_channel::Sender<Status>),
}

impl Sender {
    fn inner(&self) -> &async_channel::Sender<Status> {
        match self {
            Self::DownstreamListener(inner)
            | Self::TemplateReceiver(inner)
            | Self::BlockSubmitter(inner) => inner,
        }
    }

    pub async fn send(&self, status: Status) -> Result<(), async_channel::SendError<Status>> {
        self.inner().send(status).await
    }

    /// True once the status loop is gone.
    pub fn is_closed(&self) -> bool {
        self.inner().is_closed()
    }
}

#[derive(Debug)]
pub enum State {
    /// The stratum listener stopped accepting connections.
    DownstreamShutdown(PoolError),
    /// Template polling stopped.
    TemplateReceiverShutdown(PoolError),
    /// Block candidates can no longer be submitted.
    BlockSubmitterShutdown(PoolError),
    /// Informational, the pool keeps running.
    Healthy(String),
}

/// Status message sent to the main thread's status loop.
#[derive(Debug)]
pub struct Status {
    pub state: State,
}

/// Reports `e` to the status loop as a shutdown of the component behind `sender`.
pub async fn handle_error(sender: &Sender, e: PoolError) {
    tracing::debug!("Error: {:?}", &e);
    let state = match sender {
        Sender::DownstreamListener(_) => State::DownstreamShutdown(e),
        Sender::TemplateReceiver(_) => State::TemplateReceiverShutdown(e),
        Sender::BlockSubmitter(_) => State::BlockSubmitterShutdown(e),
    };
    sender.send(Status { state }).await.unwrap_or(());
}
