use tracing::{error, info};

use crate::connection::ConnectionPort;
use crate::error::RelayResult;
use crate::pipeline::status::{PipelineStatus, StatusTx};

/// Reconnects `port`, reporting the transition through `status`.
///
/// The error is logged before being returned, callers only decide when to retry.
pub(crate) async fn reconnect<P>(port: &P, filter: &str, status: &StatusTx) -> RelayResult<()>
where
    P: ConnectionPort,
{
    status.set_if_active(PipelineStatus::Reconnecting);

    match port.reconnect(filter).await {
        Ok(()) => {
            status.set_if_active(PipelineStatus::Running);
            info!("reconnected to the change-capture server");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "failed to reconnect to the change-capture server");
            Err(err)
        }
    }
}
