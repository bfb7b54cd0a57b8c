use serde_json::{json, Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;

use crate::result::{bail, Result};

const API_BASE: &str = "https://api.airtable.com/v0";

/// Identifier of one row in the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId(pub String);

/// The field map persisted for one video.
#[derive(Debug, Clone)]
pub struct RecordFields {
    pub video_id: String,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub status: String,
    pub source_url: String,
    /// Public link to the uploaded copy, when the upload went through.
    pub attachment: Option<String>,
    pub date_uploaded: OffsetDateTime,
}

/// Interface for the external metadata record store.
///
/// One create per task carries everything, the attachment included; there
/// is no later update call against an existing record.
pub trait RecordStore: Sync {
    /// Create one record and return its identifier.
    fn create(&self, fields: &RecordFields) -> Result<RecordId>;
}

/// Record store backed by the [Airtable REST API](https://airtable.com/developers/web/api).
pub struct Airtable {
    http: reqwest::blocking::Client,
    token: String,
    table_url: String,
}

impl Airtable {
    /// Build the client and verify the base and table are reachable.
    pub fn connect(token: &str, base_id: &str, table_name: &str) -> Result<Self> {
        let airtable = Self {
            http: reqwest::blocking::Client::new(),
            token: token.to_owned(),
            table_url: format!("{API_BASE}/{base_id}/{table_name}"),
        };

        // Probe with a one-record list so a bad token or table name fails
        // at startup, not on the first task
        let response = airtable
            .http
            .get(&airtable.table_url)
            .query(&[("maxRecords", "1")])
            .bearer_auth(&airtable.token)
            .send()?;

        if !response.status().is_success() {
            return bail(format!(
                "Airtable connection check failed with {}",
                response.status()
            ));
        }

        debug!("Airtable table reachable");
        Ok(airtable)
    }

    fn to_airtable_fields(fields: &RecordFields) -> Value {
        let mut map = Map::new();
        map.insert("Video Id".into(), fields.video_id.clone().into());
        map.insert(
            "Description".into(),
            fields
                .description
                .clone()
                .unwrap_or_else(|| "No description available".to_owned())
                .into(),
        );
        if let Some(uploader) = &fields.uploader {
            map.insert("Uploader".into(), uploader.clone().into());
        }
        map.insert("Status".into(), fields.status.clone().into());
        map.insert("Source Url".into(), fields.source_url.clone().into());
        map.insert(
            "Date Uploaded".into(),
            fields
                .date_uploaded
                .format(&Rfc3339)
                .unwrap_or_default()
                .into(),
        );
        if let Some(url) = &fields.attachment {
            map.insert("Video File".into(), json!([{ "url": url }]));
        }
        Value::Object(map)
    }

    fn record_id_of(value: &Value) -> Result<RecordId> {
        match value.get("id").and_then(Value::as_str) {
            Some(id) => Ok(RecordId(id.to_owned())),
            None => bail(format!("Airtable response carries no record id: {value}")),
        }
    }
}

impl RecordStore for Airtable {
    fn create(&self, fields: &RecordFields) -> Result<RecordId> {
        let response = self
            .http
            .post(&self.table_url)
            .bearer_auth(&self.token)
            .json(&json!({ "fields": Self::to_airtable_fields(fields) }))
            .send()?;

        if !response.status().is_success() {
            return bail(format!("Airtable create failed with {}", response.status()));
        }

        Self::record_id_of(&response.json::<Value>()?)
    }
}
