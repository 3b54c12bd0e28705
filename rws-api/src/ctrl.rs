//! Controller-level commands

use rws_client::RwsClient;
use tracing::info;

use crate::error::Result;
use crate::mastership::MastershipMode;

/// Warm-restart the controller
pub fn restart_controller(client: &RwsClient, mastership: MastershipMode) -> Result<()> {
    info!(mastership = %mastership, "restarting controller");
    client.post(
        &format!("/ctrl/restart?mastership={}", mastership),
        "restart-mode=restart",
    )?;
    Ok(())
}
