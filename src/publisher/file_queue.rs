//! File Queue — disk-backed durable queue for validated results
//!
//! Each named queue is a directory; each message is one JSON file named by
//! its message id (the workflow instance id). Files are written to a
//! temporary name and renamed into place, so a reader never observes a
//! partial message. Re-publishing an instance that is already queued is a
//! no-op, which makes replayed publishes idempotent.
//!
//! Consumers call `pending()` and `ack()` after processing; the queue scans
//! its directory on open so pending messages survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{PublishError, ResultPublisher};
use crate::types::{ClassificationResult, InstanceId};

/// Envelope written for every published result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub instance_id: InstanceId,
    pub enqueued_at: DateTime<Utc>,
    pub body: ClassificationResult,
}

/// Named, directory-backed queue.
pub struct FileQueuePublisher {
    name: String,
    queue_dir: PathBuf,
}

impl FileQueuePublisher {
    /// Create or open the queue `name` under `root`
    pub fn open<P: AsRef<Path>>(root: P, name: &str) -> Result<Self, PublishError> {
        let queue_dir = root.as_ref().join(name);
        fs::create_dir_all(&queue_dir).map_err(|e| PublishError::Unavailable {
            queue: name.to_string(),
            message: e.to_string(),
        })?;

        let queue = Self {
            name: name.to_string(),
            queue_dir,
        };

        let pending = queue.pending_count()?;
        if pending > 0 {
            info!(queue = %queue.name, pending = pending, "Queue opened with pending messages");
        } else {
            debug!(queue = %queue.name, "Queue opened (empty)");
        }

        Ok(queue)
    }

    pub fn dir(&self) -> &Path {
        &self.queue_dir
    }

    /// Read all pending messages, oldest first.
    ///
    /// Messages stay on disk until acknowledged with [`ack`](Self::ack).
    /// Corrupted entries are removed.
    pub fn pending(&self) -> Result<Vec<QueueMessage>, PublishError> {
        let mut messages = Vec::new();

        for path in self.message_paths()? {
            match fs::read(&path) {
                Ok(data) => match serde_json::from_slice::<QueueMessage>(&data) {
                    Ok(message) => messages.push(message),
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Corrupted queue entry, removing");
                        let _ = fs::remove_file(&path);
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not read queue entry");
                }
            }
        }

        messages.sort_by_key(|m| m.enqueued_at);
        Ok(messages)
    }

    /// Remove a processed message from the queue
    pub fn ack(&self, message_id: &str) -> Result<(), PublishError> {
        match fs::remove_file(self.message_path(message_id)) {
            Ok(()) => {
                debug!(queue = %self.name, message_id = message_id, "Message acknowledged");
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.unavailable(e)),
        }
    }

    pub fn pending_count(&self) -> Result<usize, PublishError> {
        Ok(self.message_paths()?.len())
    }

    fn message_paths(&self) -> Result<Vec<PathBuf>, PublishError> {
        let entries = fs::read_dir(&self.queue_dir).map_err(|e| self.unavailable(e))?;

        Ok(entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .collect())
    }

    fn message_path(&self, message_id: &str) -> PathBuf {
        let safe_id: String = message_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.queue_dir.join(format!("{safe_id}.json"))
    }

    fn unavailable(&self, e: std::io::Error) -> PublishError {
        PublishError::Unavailable {
            queue: self.name.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl ResultPublisher for FileQueuePublisher {
    async fn publish(
        &self,
        instance_id: &InstanceId,
        result: &ClassificationResult,
    ) -> Result<(), PublishError> {
        let message_id = instance_id.to_string();
        let path = self.message_path(&message_id);

        if tokio::fs::try_exists(&path).await.map_err(|e| self.unavailable(e))? {
            debug!(queue = %self.name, message_id = %message_id, "Message already queued, skipping");
            return Ok(());
        }

        let message = QueueMessage {
            message_id: message_id.clone(),
            instance_id: *instance_id,
            enqueued_at: Utc::now(),
            body: result.clone(),
        };
        let json = serde_json::to_vec(&message)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| self.unavailable(e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| self.unavailable(e))?;

        debug!(
            queue = %self.name,
            message_id = %message_id,
            size_bytes = json.len(),
            "Result enqueued"
        );
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(device: &str) -> ClassificationResult {
        ClassificationResult {
            device_id: device.to_string(),
            timestamp: Utc::now(),
            result: true,
            has_error: false,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_publish_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = FileQueuePublisher::open(tmp.path(), "results").unwrap();

        let first = InstanceId::new_v4();
        let second = InstanceId::new_v4();
        queue.publish(&first, &make_result("freezer-01")).await.unwrap();
        queue.publish(&second, &make_result("freezer-02")).await.unwrap();

        assert_eq!(queue.pending_count().unwrap(), 2);
        let messages = queue.pending().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].instance_id, first);
        assert_eq!(messages[0].message_id, first.to_string());
        assert_eq!(messages[0].body.device_id, "freezer-01");
    }

    #[tokio::test]
    async fn test_republish_same_instance_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = FileQueuePublisher::open(tmp.path(), "results").unwrap();

        let id = InstanceId::new_v4();
        queue.publish(&id, &make_result("freezer-01")).await.unwrap();
        queue.publish(&id, &make_result("freezer-01")).await.unwrap();

        assert_eq!(queue.pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = FileQueuePublisher::open(tmp.path(), "results").unwrap();

        let id = InstanceId::new_v4();
        queue.publish(&id, &make_result("freezer-01")).await.unwrap();
        queue.ack(&id.to_string()).unwrap();
        assert_eq!(queue.pending_count().unwrap(), 0);

        // Acking twice is harmless
        queue.ack(&id.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();

        {
            let queue = FileQueuePublisher::open(tmp.path(), "results").unwrap();
            queue
                .publish(&InstanceId::new_v4(), &make_result("freezer-01"))
                .await
                .unwrap();
        }

        let queue = FileQueuePublisher::open(tmp.path(), "results").unwrap();
        assert_eq!(queue.pending().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = FileQueuePublisher::open(tmp.path(), "results").unwrap();
        fs::write(queue.dir().join("garbage.json"), b"{not json").unwrap();

        assert!(queue.pending().unwrap().is_empty());
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_queue_dir_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let queue = FileQueuePublisher::open(tmp.path(), "results").unwrap();
        fs::remove_dir_all(queue.dir()).unwrap();

        let err = queue
            .publish(&InstanceId::new_v4(), &make_result("freezer-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Unavailable { .. }), "got {err:?}");
    }
}
