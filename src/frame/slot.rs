use super::Stream;
use crate::archive::{self, FrameObject, TypeRegistry};
use crate::error::{FrameError, Result};
use serde::Serialize;
use std::sync::{Arc, OnceLock};

/// What a slot currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotState {
    /// A live object is available.
    Decoded,
    /// Only the encoded bytes are held; the first typed access decodes them.
    Encoded,
    /// The bytes were dropped before anything decoded them.
    Dropped,
}

/// Storage shared by every frame that holds the same key.
///
/// Shallow frame copies share cells, so a decode through any copy is seen
/// by all of them and happens once.
pub(crate) struct SlotCell {
    type_name: String,
    decoded: OnceLock<Arc<dyn FrameObject>>,
    blob: Option<Arc<[u8]>>,
}

/// One named entry of a frame: the shared cell plus the stream the key
/// entered the frame lineage on.
#[derive(Clone)]
pub(crate) struct Slot {
    cell: Arc<SlotCell>,
    stream: Stream,
}

impl Slot {
    pub(crate) fn decoded(obj: Arc<dyn FrameObject>, stream: Stream) -> Self {
        let decoded = OnceLock::new();
        let type_name = obj.type_key().to_string();
        let _ = decoded.set(obj);
        Self {
            cell: Arc::new(SlotCell {
                type_name,
                decoded,
                blob: None,
            }),
            stream,
        }
    }

    pub(crate) fn encoded(type_name: String, blob: Arc<[u8]>, stream: Stream) -> Self {
        Self {
            cell: Arc::new(SlotCell {
                type_name,
                decoded: OnceLock::new(),
                blob: Some(blob),
            }),
            stream,
        }
    }

    pub(crate) fn type_name(&self) -> &str {
        &self.cell.type_name
    }

    pub(crate) fn stream(&self) -> Stream {
        self.stream
    }

    pub(crate) fn state(&self) -> SlotState {
        if self.cell.decoded.get().is_some() {
            SlotState::Decoded
        } else if self.cell.blob.is_some() {
            SlotState::Encoded
        } else {
            SlotState::Dropped
        }
    }

    pub(crate) fn blob_len(&self) -> Option<usize> {
        self.cell.blob.as_ref().map(|b| b.len())
    }

    /// Returns the live object, decoding the blob on first use.
    pub(crate) fn decode(
        &self,
        name: &str,
        registry: &TypeRegistry,
    ) -> Result<Arc<dyn FrameObject>> {
        if let Some(obj) = self.cell.decoded.get() {
            return Ok(Arc::clone(obj));
        }
        let blob = self
            .cell
            .blob
            .as_ref()
            .ok_or_else(|| FrameError::BlobDropped(name.to_string()))?;

        tracing::debug!(
            key = name,
            type_name = %self.cell.type_name,
            bytes = blob.len(),
            "decoding slot"
        );
        let obj = archive::decode_object(registry, blob).map_err(|e| e.in_context(name))?;
        if obj.type_key() != self.cell.type_name {
            return Err(FrameError::Codec {
                source: crate::error::CodecError::TypeMismatch {
                    expected: self.cell.type_name.clone(),
                    found: obj.type_key().to_string(),
                },
                context: Some(name.to_string()),
            });
        }
        let _ = self.cell.decoded.set(obj);
        self.cell
            .decoded
            .get()
            .cloned()
            .ok_or_else(|| FrameError::Internal(format!("slot '{name}' lost its decoded value")))
    }

    /// The bytes to write for this slot: the live object re-encoded if it
    /// was ever decoded, the original blob otherwise.
    pub(crate) fn encode(&self, name: &str, registry: &TypeRegistry) -> Result<Arc<[u8]>> {
        if let Some(obj) = self.cell.decoded.get() {
            let bytes = archive::encode_object(registry, obj).map_err(|e| e.in_context(name))?;
            return Ok(Arc::from(bytes));
        }
        self.cell
            .blob
            .clone()
            .ok_or_else(|| FrameError::BlobDropped(name.to_string()))
    }

    /// A copy of this slot without encoded bytes. Other frames sharing the
    /// old cell keep theirs.
    pub(crate) fn without_blob(&self) -> Self {
        let decoded = OnceLock::new();
        if let Some(obj) = self.cell.decoded.get() {
            let _ = decoded.set(Arc::clone(obj));
        }
        Self {
            cell: Arc::new(SlotCell {
                type_name: self.cell.type_name.clone(),
                decoded,
                blob: None,
            }),
            stream: self.stream,
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("type_name", &self.cell.type_name)
            .field("stream", &self.stream)
            .field("state", &self.state())
            .field("blob_len", &self.blob_len())
            .finish()
    }
}
