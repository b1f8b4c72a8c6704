//! Client-side checks for coupon image uploads.
//!
//! Images are validated before any upload is attempted. The storage bucket
//! enforces its own limits too, but a rejected file here never leaves the
//! server.

use uuid::Uuid;

use crate::types::UserId;

/// Largest accepted image: 2 MiB. A file of exactly this size is accepted.
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;

/// Accepted content types and the file extension used for the object key.
const ALLOWED_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("image must be at most 2 MB (got {size} bytes)")]
    TooLarge { size: usize },
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("image file is empty")]
    Empty,
}

/// An image that passed validation and is ready to upload.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    content_type: &'static str,
    extension: &'static str,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageUpload {
    /// Validate an uploaded file.
    ///
    /// The size check runs first, so an oversized file is reported as too
    /// large even when its type is also wrong.
    ///
    /// # Errors
    ///
    /// Returns an [`ImageError`] for empty, oversized or non-image files.
    pub fn validate(content_type: &str, bytes: Vec<u8>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge { size: bytes.len() });
        }
        let normalized = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let (content_type, extension) = ALLOWED_TYPES
            .iter()
            .find(|(mime, _)| *mime == normalized)
            .copied()
            .ok_or_else(|| ImageError::UnsupportedType(content_type.to_owned()))?;

        Ok(Self {
            content_type,
            extension,
            bytes,
        })
    }

    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        self.content_type
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Storage key `{user_id}/{uuid}.{ext}`.
    ///
    /// The owner prefix lets bucket policies restrict writes to a user's own
    /// folder.
    #[must_use]
    pub fn object_key(&self, owner: UserId, name: Uuid) -> String {
        format!("{owner}/{name}.{}", self.extension)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_two_mib_is_accepted() {
        let upload = ImageUpload::validate("image/png", vec![0; MAX_IMAGE_BYTES]).unwrap();
        assert_eq!(upload.len(), 2_097_152);
    }

    #[test]
    fn test_one_byte_over_is_rejected() {
        assert_eq!(
            ImageUpload::validate("image/png", vec![0; MAX_IMAGE_BYTES + 1]),
            Err(ImageError::TooLarge { size: 2_097_153 })
        );
    }

    #[test]
    fn test_type_checks() {
        assert!(ImageUpload::validate("image/webp", vec![1]).is_ok());
        assert!(ImageUpload::validate("IMAGE/JPEG; charset=binary", vec![1]).is_ok());
        assert_eq!(
            ImageUpload::validate("application/pdf", vec![1]),
            Err(ImageError::UnsupportedType("application/pdf".into()))
        );
        assert_eq!(ImageUpload::validate("image/png", Vec::new()), Err(ImageError::Empty));
    }

    #[test]
    fn test_object_key_layout() {
        let owner = UserId::new(Uuid::nil());
        let name = Uuid::nil();
        let upload = ImageUpload::validate("image/jpeg", vec![1, 2, 3]).unwrap();
        assert_eq!(
            upload.object_key(owner, name),
            "00000000-0000-0000-0000-000000000000/00000000-0000-0000-0000-000000000000.jpg"
        );
    }
}
