use crate::{CoreResult, capture::RawFrame};

use tokio::sync::oneshot;

/// Requests from the UI layer to the controller.
#[derive(Debug)]
pub(crate) enum ControllerCommand {
    ManualStart,
    ManualStop,
    Screenshot {
        reply: oneshot::Sender<CoreResult<RawFrame>>,
    },
    Shutdown,
}
