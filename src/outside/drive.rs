use std::{fs::File, path::Path};

use serde_json::{json, Value};
use tracing::debug;

use crate::result::{bail, Result};

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// Interface for the file-hosting service: takes a local file, returns a
/// public shareable link.
pub trait FileHost: Sync {
    fn upload(&self, path: &Path) -> Result<String>;
}

/// File host backed by Google Drive v3 with a bearer token.
pub struct Drive {
    http: reqwest::blocking::Client,
    token: String,
}

impl Drive {
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            token: token.to_owned(),
        }
    }

    fn check(response: reqwest::blocking::Response, action: &str) -> Result<Value> {
        if !response.status().is_success() {
            return bail(format!("Drive {action} failed with {}", response.status()));
        }
        Ok(response.json()?)
    }
}

impl FileHost for Drive {
    fn upload(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_owned());

        // Simple media upload first; name and visibility follow as
        // metadata calls on the returned id
        let response = self
            .http
            .post(UPLOAD_URL)
            .query(&[("uploadType", "media")])
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .body(File::open(path)?)
            .send()?;

        let uploaded = Self::check(response, "upload")?;
        let file_id = match uploaded.get("id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => return bail(format!("Drive upload returned no file id: {uploaded}")),
        };
        debug!("Uploaded {} as Drive file {file_id}", path.display());

        let response = self
            .http
            .patch(format!("{FILES_URL}/{file_id}"))
            .bearer_auth(&self.token)
            .json(&json!({ "name": file_name }))
            .send()?;
        Self::check(response, "rename")?;

        // The record store fetches the attachment itself, so the link has
        // to be readable without credentials
        let response = self
            .http
            .post(format!("{FILES_URL}/{file_id}/permissions"))
            .bearer_auth(&self.token)
            .json(&json!({ "type": "anyone", "role": "reader" }))
            .send()?;
        Self::check(response, "permission grant")?;

        Ok(format!("https://drive.google.com/uc?id={file_id}"))
    }
}
