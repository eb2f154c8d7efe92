//! Pending attachments for the next outgoing message

use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

use crate::message::Part;

pub const DEFAULT_DISPLAY_NAME: &str = "Unnamed file";

/// A decoded image payload
#[derive(Clone)]
pub struct DecodedImage(Arc<DynamicImage>);

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.0
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// A file picked by the user, waiting to go out with the next message
#[derive(Debug, Clone)]
pub struct Attachment {
    pub display_name: Option<String>,
    pub image: Option<DecodedImage>,
    pub bytes: Arc<[u8]>,
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(DEFAULT_DISPLAY_NAME)
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Only decoded images are sent; everything else is listed but not transmitted.
    pub fn to_part(&self) -> Option<Part> {
        self.image.as_ref()?;
        let mime_type = self
            .mime_type
            .clone()
            .unwrap_or_else(|| "image/png".to_string());
        Some(Part::Image {
            mime_type,
            data: Arc::clone(&self.bytes),
        })
    }
}

fn is_image_mime(mime_type: Option<&str>) -> bool {
    mime_type.map_or(false, |m| m.contains("image"))
}

/// Buffers attachments until the next message is built
#[derive(Debug, Clone, Default)]
pub struct AttachmentStager {
    pending: Vec<Attachment>,
}

impl AttachmentStager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a file. Undecodable images degrade to a metadata-only attachment.
    pub fn stage(
        &mut self,
        bytes: impl Into<Arc<[u8]>>,
        mime_type: Option<&str>,
        display_name: Option<&str>,
    ) -> &Attachment {
        let bytes = bytes.into();
        let display_name = Some(display_name.unwrap_or(DEFAULT_DISPLAY_NAME).to_string());

        let image = if is_image_mime(mime_type) {
            match image::load_from_memory(&bytes) {
                Ok(decoded) => Some(DecodedImage(Arc::new(decoded))),
                Err(e) => {
                    tracing::warn!(
                        name = display_name.as_deref().unwrap_or_default(),
                        error = %e,
                        "could not decode image attachment, keeping metadata only"
                    );
                    None
                }
            }
        } else {
            None
        };

        self.pending.push(Attachment {
            display_name,
            image,
            bytes,
            mime_type: mime_type.map(str::to_string),
        });
        let idx = self.pending.len() - 1;
        &self.pending[idx]
    }

    /// Take every pending attachment, leaving the stager empty
    pub fn drain(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
