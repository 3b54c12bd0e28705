//! RAPID program execution and symbol data

use rws_client::RwsClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};
use crate::mastership::MastershipMode;
use crate::resource::RapidResource;
use crate::xml;

pub const EXECUTION_PATH: &str = "/rw/rapid/execution";

/// Whether the RAPID program is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RapidExecutionState {
    Running,
    Stopped,
}

impl RapidExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RapidExecutionState::Running => "running",
            RapidExecutionState::Stopped => "stopped",
        }
    }
}

impl FromStr for RapidExecutionState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RapidExecutionState::Running),
            "stopped" => Ok(RapidExecutionState::Stopped),
            other => Err(ProtocolError::with_context(
                "unexpected RAPID execution state",
                other,
            )),
        }
    }
}

impl fmt::Display for RapidExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn get_execution_state(client: &RwsClient) -> Result<RapidExecutionState> {
    let root = xml::parse_xhtml(&client.get(EXECUTION_PATH)?.body)?;
    Ok(xml::require_text_by_class(&root, "ctrlexecstate")?.parse()?)
}

/// Start RAPID execution from the current program pointer, cycling forever
pub fn start_execution(client: &RwsClient, mastership: MastershipMode) -> Result<()> {
    let path = format!("{}/start?mastership={}", EXECUTION_PATH, mastership);
    client.post(
        &path,
        "regain=continue&execmode=continue&cycle=forever&condition=none&stopatbp=disabled&alltaskbytsp=false",
    )?;
    Ok(())
}

pub fn stop_execution(client: &RwsClient) -> Result<()> {
    client.post(&format!("{}/stop", EXECUTION_PATH), "stopmode=stop")?;
    Ok(())
}

/// Current value of a RAPID symbol in its RAPID text form
pub fn get_symbol_data(client: &RwsClient, resource: &RapidResource) -> Result<String> {
    let path = format!("{}/data", resource.symbol_uri());
    let root = xml::parse_xhtml(&client.get(&path)?.body)?;
    Ok(xml::require_text_by_class(&root, "value")?)
}
