//! Turns user input into Gemini content parts and full request payloads.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::api::{GenerateContentRequest, GenerationConfig, SafetySetting};
use crate::core::message::{Part, Turn};

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Sampling parameters attached to every request. Not user configurable.
pub const GENERATION_CONFIG: GenerationConfig = GenerationConfig {
    temperature: 0.9,
    top_k: 40,
    top_p: 0.95,
    max_output_tokens: 2048,
};

const BLOCK_MEDIUM_AND_ABOVE: &str = "BLOCK_MEDIUM_AND_ABOVE";

pub const SAFETY_SETTINGS: [SafetySetting; 4] = [
    SafetySetting {
        category: "HARM_CATEGORY_HARASSMENT",
        threshold: BLOCK_MEDIUM_AND_ABOVE,
    },
    SafetySetting {
        category: "HARM_CATEGORY_HATE_SPEECH",
        threshold: BLOCK_MEDIUM_AND_ABOVE,
    },
    SafetySetting {
        category: "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        threshold: BLOCK_MEDIUM_AND_ABOVE,
    },
    SafetySetting {
        category: "HARM_CATEGORY_DANGEROUS_CONTENT",
        threshold: BLOCK_MEDIUM_AND_ABOVE,
    },
];

/// Raw image bytes plus whatever MIME hint the caller had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug)]
pub enum ImageError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    NotAnImage {
        mime_type: String,
    },
    TooLarge {
        size: usize,
    },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::Read { path, source } => {
                write!(f, "Failed to read image {}: {}", path.display(), source)
            }
            ImageError::NotAnImage { mime_type } => {
                write!(f, "Please select a valid image file (got {mime_type})")
            }
            ImageError::TooLarge { size } => write!(
                f,
                "Image size must be less than 4MB (got {:.1}MB)",
                *size as f64 / (1024.0 * 1024.0)
            ),
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ImageInput {
    pub fn new(data: Vec<u8>, mime_type: Option<String>) -> Self {
        Self {
            data,
            mime_type,
            file_name: None,
        }
    }

    /// Reads an image file to completion, guessing its MIME type from the
    /// extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| ImageError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Ok(Self {
            data,
            mime_type,
            file_name,
        })
    }

    /// The MIME type sent on the wire, falling back to `image/jpeg`.
    pub fn effective_mime_type(&self) -> &str {
        self.mime_type
            .as_deref()
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
    }

    /// Rejects non-image MIME types and payloads larger than 4 MiB.
    pub fn validate(&self) -> Result<(), ImageError> {
        let mime_type = self.effective_mime_type();
        if !mime_type.starts_with("image/") {
            return Err(ImageError::NotAnImage {
                mime_type: mime_type.to_string(),
            });
        }
        if self.data.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge {
                size: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("image")
    }
}

/// Builds the parts of a pending user turn: trimmed text first, then the
/// image. Returns an empty vec when there is nothing to send.
pub fn build_parts(text: Option<&str>, image: Option<&ImageInput>) -> Vec<Part> {
    let mut parts = Vec::with_capacity(2);

    if let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) {
        parts.push(Part::text(text));
    }

    if let Some(image) = image {
        parts.push(Part::Image {
            mime_type: image.effective_mime_type().to_string(),
            data: image.data.clone(),
        });
    }

    parts
}

/// Full request for `history` followed by one trailing user turn holding
/// `pending`.
pub fn build_request_payload(history: &[Turn], pending: Vec<Part>) -> GenerateContentRequest {
    let mut contents = Vec::with_capacity(history.len() + 1);
    contents.extend(history.iter().map(Turn::to_wire));
    contents.push(Turn::user(pending).to_wire());

    GenerateContentRequest {
        contents,
        generation_config: GENERATION_CONFIG,
        safety_settings: SAFETY_SETTINGS.to_vec(),
    }
}
