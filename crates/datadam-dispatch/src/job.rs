use tokio::sync::oneshot;

use datadam_core::{DmlParams, Result};

/// Unit of work carried by a lane queue.
#[derive(Debug)]
pub(crate) enum Job {
    /// Regular payload, accumulated into the lane's batch.
    Dml(DmlParams),
    /// Schema change, executed on arrival and acknowledged with its outcome.
    Ddl {
        params: DmlParams,
        done: oneshot::Sender<Result<()>>,
    },
    /// Execute the pending batch now and acknowledge.
    Flush { done: oneshot::Sender<()> },
}
