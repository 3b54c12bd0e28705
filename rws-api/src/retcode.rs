//! Return-code descriptions

use rws_client::RwsClient;
use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::error::{ProtocolError, Result};
use crate::xml;

/// Description of a controller return code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetcodeInfo {
    pub code: i32,
    pub name: String,
    pub severity: String,
    pub description: String,
}

impl RetcodeInfo {
    fn from_element(element: &Element) -> std::result::Result<Self, ProtocolError> {
        let code = xml::require_text_by_class(element, "code")?;
        let code = code
            .parse::<i32>()
            .map_err(|_| ProtocolError::with_context("retcode is not a number", code))?;

        Ok(Self {
            code,
            name: xml::find_text_by_class(element, "name").unwrap_or_default(),
            severity: xml::find_text_by_class(element, "severity").unwrap_or_default(),
            description: xml::find_text_by_class(element, "description").unwrap_or_default(),
        })
    }
}

/// Look up the description of one return code
pub fn get_retcode_info(client: &RwsClient, code: i32) -> Result<RetcodeInfo> {
    let body = client.get(&format!("/rw/retcode?code={}", code))?.body;
    parse_retcode_info(&body).map_err(Into::into)
}

fn parse_retcode_info(body: &str) -> std::result::Result<RetcodeInfo, ProtocolError> {
    let root = xml::parse_xhtml(body)?;
    let element = xml::find_elements_by_class(&root, "err-desc")
        .into_iter()
        .next()
        .ok_or_else(|| ProtocolError::with_context("Unable to find error description", body))?;
    RetcodeInfo::from_element(element)
}
