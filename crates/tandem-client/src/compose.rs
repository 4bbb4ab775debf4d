//! Compose state for one conversation: the text target plus its staged
//! attachments.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use tandem_shared::ConversationKey;
use tandem_store::Message;

use crate::error::{SendError, ValidationError};
use crate::handle::EngineHandle;
use crate::staging::{AttachmentRejection, AttachmentStagingArea, LocalFile, PreviewProvider};

#[derive(Debug)]
pub struct ComposeSession {
    target: Option<ConversationKey>,
    staging: AttachmentStagingArea,
}

impl ComposeSession {
    pub fn new(previews: Arc<dyn PreviewProvider>) -> Self {
        Self {
            target: None,
            staging: AttachmentStagingArea::new(previews),
        }
    }

    pub fn target(&self) -> Option<&ConversationKey> {
        self.target.as_ref()
    }

    /// Point the session at `key`. Switching to a different conversation
    /// discards anything staged for the previous one.
    pub fn retarget(&mut self, key: ConversationKey) {
        if self.target.as_ref() == Some(&key) {
            return;
        }
        if !self.staging.is_empty() {
            debug!(
                discarded = self.staging.len(),
                key = %key,
                "Compose target changed, clearing staged attachments"
            );
        }
        self.staging.clear();
        self.target = Some(key);
    }

    pub fn attach(&mut self, files: Vec<LocalFile>) -> Result<Vec<Uuid>, AttachmentRejection> {
        self.staging.add(files)
    }

    pub fn detach(&mut self, local_id: Uuid) -> bool {
        self.staging.remove(local_id)
    }

    pub fn staging(&self) -> &AttachmentStagingArea {
        &self.staging
    }

    /// Send `body` and everything staged to the current target.
    ///
    /// The staging area is drained only when the send succeeds. A refusal by
    /// the match gate or a failed upload leaves the files staged for retry.
    pub async fn send(&mut self, engine: &EngineHandle, body: &str) -> Result<Message, SendError> {
        let key = self.target.clone().ok_or(ValidationError::NoTarget)?;
        if body.trim().is_empty() && self.staging.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let attachments = self.staging.drain_on_send();
        match engine.send_returning(&key, body.to_string(), attachments).await {
            Ok(message) => Ok(message),
            Err(failure) => {
                self.staging.restore(failure.returned);
                Err(failure.error)
            }
        }
    }
}
