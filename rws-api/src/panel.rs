//! Operator panel resources: controller state, operation mode and speed ratio

use rws_client::RwsClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result, ValidationError};
use crate::xml;

pub const CTRL_STATE_PATH: &str = "/rw/panel/ctrl-state";
pub const OPMODE_PATH: &str = "/rw/panel/opmode";
pub const SPEED_RATIO_PATH: &str = "/rw/panel/speedratio";

/// Highest speed ratio the controller accepts, in percent
pub const MAX_SPEED_RATIO: u32 = 100;

/// Controller (motor) state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerState {
    Init,
    MotorOn,
    MotorOff,
    GuardStop,
    EmergencyStop,
    EmergencyStopReset,
    SysFail,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Init => "init",
            ControllerState::MotorOn => "motoron",
            ControllerState::MotorOff => "motoroff",
            ControllerState::GuardStop => "guardstop",
            ControllerState::EmergencyStop => "emergencystop",
            ControllerState::EmergencyStopReset => "emergencystopreset",
            ControllerState::SysFail => "sysfail",
        }
    }
}

impl FromStr for ControllerState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "init" => Ok(ControllerState::Init),
            "motoron" => Ok(ControllerState::MotorOn),
            "motoroff" => Ok(ControllerState::MotorOff),
            "guardstop" => Ok(ControllerState::GuardStop),
            "emergencystop" => Ok(ControllerState::EmergencyStop),
            "emergencystopreset" => Ok(ControllerState::EmergencyStopReset),
            "sysfail" => Ok(ControllerState::SysFail),
            other => Err(ProtocolError::with_context(
                "unexpected controller state",
                other,
            )),
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation mode selected on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationMode {
    Init,
    /// Change to automatic requested
    AutoChange,
    /// Change to manual full speed requested
    ManualFullChange,
    ManualReduced,
    ManualFull,
    Auto,
    Undefined,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::Init => "INIT",
            OperationMode::AutoChange => "AUTO_CH",
            OperationMode::ManualFullChange => "MANF_CH",
            OperationMode::ManualReduced => "MANR",
            OperationMode::ManualFull => "MANF",
            OperationMode::Auto => "AUTO",
            OperationMode::Undefined => "UNDEF",
        }
    }
}

impl FromStr for OperationMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(OperationMode::Init),
            "AUTO_CH" => Ok(OperationMode::AutoChange),
            "MANF_CH" => Ok(OperationMode::ManualFullChange),
            "MANR" => Ok(OperationMode::ManualReduced),
            "MANF" => Ok(OperationMode::ManualFull),
            "AUTO" => Ok(OperationMode::Auto),
            "UNDEF" => Ok(OperationMode::Undefined),
            other => Err(ProtocolError::with_context(
                "unexpected operation mode",
                other,
            )),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn get_controller_state(client: &RwsClient) -> Result<ControllerState> {
    let root = xml::parse_xhtml(&client.get(CTRL_STATE_PATH)?.body)?;
    Ok(xml::require_text_by_class(&root, "ctrlstate")?.parse()?)
}

/// Switch the motors on or off, or request another controller state
pub fn set_controller_state(client: &RwsClient, state: ControllerState) -> Result<()> {
    let body = format!("ctrl-state={}", state);
    client.post(CTRL_STATE_PATH, &body)?;
    Ok(())
}

pub fn get_operation_mode(client: &RwsClient) -> Result<OperationMode> {
    let root = xml::parse_xhtml(&client.get(OPMODE_PATH)?.body)?;
    Ok(xml::require_text_by_class(&root, "opmode")?.parse()?)
}

/// Current speed ratio in percent
pub fn get_speed_ratio(client: &RwsClient) -> Result<u32> {
    let root = xml::parse_xhtml(&client.get(SPEED_RATIO_PATH)?.body)?;
    let text = xml::require_text_by_class(&root, "speedratio")?;
    text.parse::<u32>()
        .map_err(|_| ProtocolError::with_context("speed ratio is not a number", text).into())
}

/// Set the speed ratio, in percent
///
/// Values above 100 are rejected before anything is sent.
pub fn set_speed_ratio(client: &RwsClient, ratio: u32) -> Result<()> {
    validate_speed_ratio(ratio)?;
    let body = format!("speed-ratio={}", ratio);
    client.post(&format!("{}?action=setspeedratio", SPEED_RATIO_PATH), &body)?;
    Ok(())
}

fn validate_speed_ratio(ratio: u32) -> std::result::Result<(), ValidationError> {
    if ratio > MAX_SPEED_RATIO {
        return Err(ValidationError::range_error(
            "speed-ratio",
            0,
            MAX_SPEED_RATIO,
            ratio,
        ));
    }
    Ok(())
}
