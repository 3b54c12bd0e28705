//! Configuration database loading

use rws_client::RwsClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProtocolError, Result, ValidationError};
use crate::mastership::MastershipMode;

const PROGRESS_SEGMENT: &str = "/progress/";

/// A file on the controller's file system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResource {
    /// Directory path without a `/fileservice/` prefix, e.g. `$HOME`
    pub directory: String,
    pub filename: String,
}

impl FileResource {
    pub fn new(directory: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.directory, self.filename)
    }
}

/// Load a configuration file, replacing the existing configuration
///
/// Returns the id of the controller progress resource tracking the load.
pub fn load_cfg_file(
    client: &RwsClient,
    resource: &FileResource,
    mastership: MastershipMode,
) -> Result<String> {
    if resource.filename.is_empty() {
        return Err(ValidationError::missing("filename").into());
    }

    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("filepath", &resource.path())
        .append_pair("action-type", "replace")
        .finish();
    let path = format!("/rw/cfg/load?mastership={}", mastership);

    let response = client.send("POST", &path, Some(&body), &[200, 202, 204])?;
    let progress_id = response
        .location
        .as_deref()
        .and_then(progress_id_from_location)
        .ok_or_else(|| ProtocolError::new("CFGFile progress id not found."))?;

    debug!(file = %resource.path(), progress_id = %progress_id, "configuration load started");
    Ok(progress_id)
}

fn progress_id_from_location(location: &str) -> Option<String> {
    let start = location.find(PROGRESS_SEGMENT)? + PROGRESS_SEGMENT.len();
    let id = &location[start..];
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
