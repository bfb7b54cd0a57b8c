use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    outside::{FileHost, RecordFields, RecordId, RecordStore},
    result::Result,
    task::DownloadTask,
};

/// Turns a terminal task into its one record-store call.
///
/// Adopted policy: a single create with the attachment already resolved.
/// When the task carries a downloaded file, the file is uploaded first and
/// its link attached only if the upload succeeded; the record itself is
/// created either way, so a hosting outage never erases the scrape.
pub struct Recorder<'a> {
    store: &'a dyn RecordStore,
    host: &'a dyn FileHost,
}

impl<'a> Recorder<'a> {
    pub fn new(store: &'a dyn RecordStore, host: &'a dyn FileHost) -> Self {
        Self { store, host }
    }

    pub fn record(&self, task: &DownloadTask) -> Result<RecordId> {
        let attachment = task.found_file().and_then(|path| {
            info!("Uploading {}", path.display());
            match self.host.upload(path) {
                Ok(link) => {
                    info!("Uploaded: {link}");
                    Some(link)
                }
                Err(err) => {
                    // Best-effort: the record still documents the download
                    warn!(
                        "Upload of {} failed, recording without attachment: {}",
                        path.display(),
                        err.reason()
                    );
                    None
                }
            }
        });

        let fields = RecordFields {
            video_id: task.video_id.clone(),
            description: task.description.clone(),
            uploader: task.uploader.clone(),
            status: task.status().label(),
            source_url: task.source_url.clone(),
            attachment,
            date_uploaded: OffsetDateTime::now_utc(),
        };

        info!(
            "Creating record for video {} with status '{}'",
            fields.video_id, fields.status
        );
        let id = self.store.create(&fields)?;
        info!("Record {} created", id.0);
        Ok(id)
    }
}
