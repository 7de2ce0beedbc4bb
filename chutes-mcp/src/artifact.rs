use base64::Engine;
use bytes::Bytes;
use chutes_mcp_core::{
    tool_audio_content, tool_image_content,
    types::{Annotations, EmbeddedResource, ResourceContents, ToolResponseContent},
};
use url::Url;

use crate::error::{Result, ToolError};

/// Annotation key carrying the public URL of an uploaded artifact.
pub const IMAGEKIT_URL: &str = "imagekit_url";

const LOCAL_VIDEO_URI: &str = "file:///generated_video.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Jpeg,
    Wav,
    Mp4,
}

impl MediaFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "jpeg",
            MediaFormat::Wav => "wav",
            MediaFormat::Mp4 => "mp4",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Wav => "audio/wav",
            MediaFormat::Mp4 => "video/mp4",
        }
    }
}

/// Binary output of a generation call.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub data: Bytes,
    pub format: MediaFormat,
    pub url: Option<String>,
}

impl GeneratedArtifact {
    pub fn new(data: Bytes, format: MediaFormat) -> Self {
        Self {
            data,
            format,
            url: None,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    /// `imagekit_url` when the artifact was published, otherwise nothing.
    pub fn annotations(&self) -> Option<Annotations> {
        self.url
            .as_ref()
            .map(|url| Annotations::with_entry(IMAGEKIT_URL, url.clone()))
    }

    /// Images and audio become inline content; videos an embedded resource
    /// whose URI is the published URL when there is one.
    pub fn into_content(self) -> Result<ToolResponseContent> {
        let annotations = self.annotations();
        let data = base64::engine::general_purpose::STANDARD.encode(&self.data);
        let mime_type = self.format.mime_type().to_string();

        Ok(match self.format {
            MediaFormat::Jpeg => tool_image_content!(data, mime_type, annotations),
            MediaFormat::Wav => tool_audio_content!(data, mime_type, annotations),
            MediaFormat::Mp4 => {
                let uri = self.url.as_deref().unwrap_or(LOCAL_VIDEO_URI);
                let uri = Url::parse(uri)
                    .map_err(|e| ToolError::Unexpected(format!("invalid resource uri {}: {}", uri, e)))?;
                ToolResponseContent::Resource(EmbeddedResource {
                    resource: ResourceContents {
                        uri,
                        mime_type: Some(mime_type),
                        text: None,
                        blob: Some(data),
                    },
                    annotations,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpublished_image_has_no_annotations() {
        let artifact = GeneratedArtifact::new(Bytes::from_static(b"jpg"), MediaFormat::Jpeg);
        assert!(artifact.annotations().is_none());
        match artifact.into_content().unwrap() {
            ToolResponseContent::Image(image) => {
                assert_eq!(image.data, "anBn");
                assert_eq!(image.mime_type, "image/jpeg");
                assert!(image.annotations.is_none());
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_published_audio_keeps_url() {
        let url = "https://ik.imagekit.io/demo/Chutes/song.wav";
        let content = GeneratedArtifact::new(Bytes::from_static(b"wav"), MediaFormat::Wav)
            .with_url(Some(url.to_string()))
            .into_content()
            .unwrap();
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["mimeType"], "audio/wav");
        assert_eq!(json["annotations"][IMAGEKIT_URL], url);
    }

    #[test]
    fn test_published_video_points_at_url() {
        let url = "https://ik.imagekit.io/demo/Chutes/clip.mp4";
        let content = GeneratedArtifact::new(Bytes::from_static(b"mp4"), MediaFormat::Mp4)
            .with_url(Some(url.to_string()))
            .into_content()
            .unwrap();
        let published = content.annotations().and_then(|a| a.get(IMAGEKIT_URL));
        assert_eq!(published, Some(&serde_json::json!(url)));
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "resource");
        assert_eq!(json["resource"]["uri"], url);
        assert_eq!(json["resource"]["mimeType"], "video/mp4");
        assert_eq!(json["annotations"][IMAGEKIT_URL], url);
    }

    #[test]
    fn test_local_video_uri() {
        let content = GeneratedArtifact::new(Bytes::from_static(b"mp4"), MediaFormat::Mp4)
            .into_content()
            .unwrap();
        match content {
            ToolResponseContent::Resource(resource) => {
                assert_eq!(resource.resource.uri.as_str(), LOCAL_VIDEO_URI);
                assert!(resource.annotations.is_none());
            }
            other => panic!("unexpected content {:?}", other),
        }
    }
}
