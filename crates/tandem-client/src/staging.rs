//! Attachment staging before send.
//!
//! Every staged file holds a preview handle. The handle releases its preview
//! when dropped, so removing a candidate, draining the area into a send that
//! later resolves, clearing it, or dropping the area all free the preview
//! exactly once.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use tandem_net::OutgoingAttachment;
use tandem_shared::constants::{IMAGE_MEDIA_PREFIX, MAX_ATTACHMENTS, MAX_ATTACHMENT_SIZE};
use tandem_store::AttachmentRef;

/// Why a batch of files was refused. The whole batch is refused together.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachmentRejection {
    #[error("Too many attachments: {staged} staged + {incoming} new exceeds {max}")]
    TooMany {
        staged: usize,
        incoming: usize,
        max: usize,
    },

    #[error("{name} is too large: {size} bytes (max {max})")]
    TooLarge { name: String, size: u64, max: u64 },

    #[error("{name} is not an image ({media_type})")]
    WrongType { name: String, media_type: String },
}

/// A file selected on the device.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub media_type: String,
    pub data: Bytes,
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.data.len())
            .finish()
    }
}

impl LocalFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, guessing its media type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, media_type_for(path), data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with(IMAGE_MEDIA_PREFIX)
    }
}

fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("bmp") => "image/bmp",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Previews
// ---------------------------------------------------------------------------

/// Creates and frees the local previews shown for staged files.
pub trait PreviewProvider: Send + Sync {
    /// Returns a reference the UI can render (an object URL, a cache path).
    fn acquire(&self, local_id: Uuid, file: &LocalFile) -> String;

    fn release(&self, local_id: Uuid);
}

/// Previews that need no cleanup; used when no UI renders them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreviews;

impl PreviewProvider for NoopPreviews {
    fn acquire(&self, local_id: Uuid, _file: &LocalFile) -> String {
        format!("preview:{local_id}")
    }

    fn release(&self, _local_id: Uuid) {}
}

/// Owned preview; released on drop.
pub struct PreviewHandle {
    local_id: Uuid,
    reference: String,
    provider: Arc<dyn PreviewProvider>,
}

impl PreviewHandle {
    fn acquire(provider: &Arc<dyn PreviewProvider>, local_id: Uuid, file: &LocalFile) -> Self {
        let reference = provider.acquire(local_id, file);
        Self {
            local_id,
            reference,
            provider: Arc::clone(provider),
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("local_id", &self.local_id)
            .field("reference", &self.reference)
            .finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.provider.release(self.local_id);
    }
}

// ---------------------------------------------------------------------------
// Candidates and the staging area
// ---------------------------------------------------------------------------

/// A staged file together with its preview.
#[derive(Debug)]
pub struct AttachmentCandidate {
    pub local_id: Uuid,
    pub file: LocalFile,
    pub preview: PreviewHandle,
}

impl AttachmentCandidate {
    /// Upload payload. The candidate, and its preview, stay alive until the
    /// caller drops them.
    pub fn to_outgoing(&self) -> OutgoingAttachment {
        OutgoingAttachment {
            name: self.file.name.clone(),
            media_type: self.file.media_type.clone(),
            data: self.file.data.clone(),
        }
    }

    /// Reference shown in the optimistic timeline entry until the server
    /// echo replaces it.
    pub fn to_local_ref(&self) -> AttachmentRef {
        AttachmentRef {
            url: self.preview.reference().to_string(),
            name: Some(self.file.name.clone()),
            media_type: Some(self.file.media_type.clone()),
            size: Some(self.file.size()),
        }
    }
}

/// Check a batch against what is already staged.
pub fn validate_batch(staged: usize, files: &[LocalFile]) -> Result<(), AttachmentRejection> {
    if staged + files.len() > MAX_ATTACHMENTS {
        return Err(AttachmentRejection::TooMany {
            staged,
            incoming: files.len(),
            max: MAX_ATTACHMENTS,
        });
    }
    for file in files {
        if file.size() > MAX_ATTACHMENT_SIZE {
            return Err(AttachmentRejection::TooLarge {
                name: file.name.clone(),
                size: file.size(),
                max: MAX_ATTACHMENT_SIZE,
            });
        }
        if !file.is_image() {
            return Err(AttachmentRejection::WrongType {
                name: file.name.clone(),
                media_type: file.media_type.clone(),
            });
        }
    }
    Ok(())
}

pub struct AttachmentStagingArea {
    candidates: Vec<AttachmentCandidate>,
    previews: Arc<dyn PreviewProvider>,
}

impl fmt::Debug for AttachmentStagingArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentStagingArea")
            .field("candidates", &self.candidates)
            .finish()
    }
}

impl Default for AttachmentStagingArea {
    fn default() -> Self {
        Self::new(Arc::new(NoopPreviews))
    }
}

impl AttachmentStagingArea {
    pub fn new(previews: Arc<dyn PreviewProvider>) -> Self {
        Self {
            candidates: Vec::new(),
            previews,
        }
    }

    /// Stage `files` all together or not at all.
    ///
    /// Returns the local ids of the new candidates.
    pub fn add(&mut self, files: Vec<LocalFile>) -> Result<Vec<Uuid>, AttachmentRejection> {
        validate_batch(self.candidates.len(), &files)?;

        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let local_id = Uuid::new_v4();
            let preview = PreviewHandle::acquire(&self.previews, local_id, &file);
            self.candidates.push(AttachmentCandidate {
                local_id,
                file,
                preview,
            });
            ids.push(local_id);
        }
        debug!(added = ids.len(), staged = self.candidates.len(), "Staged attachments");
        Ok(ids)
    }

    pub fn remove(&mut self, local_id: Uuid) -> bool {
        let before = self.candidates.len();
        self.candidates.retain(|c| c.local_id != local_id);
        self.candidates.len() != before
    }

    /// Hand every staged candidate to a send, leaving the area empty.
    pub fn drain_on_send(&mut self) -> Vec<AttachmentCandidate> {
        std::mem::take(&mut self.candidates)
    }

    /// Put back candidates from a send that did not go through, ahead of
    /// anything staged since.
    pub(crate) fn restore(&mut self, mut returned: Vec<AttachmentCandidate>) {
        if returned.is_empty() {
            return;
        }
        debug!(restored = returned.len(), "Send failed, attachments staged again");
        returned.append(&mut self.candidates);
        self.candidates = returned;
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[AttachmentCandidate] {
        &self.candidates
    }
}
