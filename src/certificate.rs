use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TITLE: &str = "Certificate";
const DOCUMENT_EXTENSION: &str = ".pdf";
// Applied to every download regardless of content kind.
const DOWNLOAD_SUFFIX: &str = ".pdf";
const DOCUMENT_VIEWER_PARAMS: &str = "#toolbar=0&navpanes=0&scrollbar=1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Image,
    Document,
}

impl ContentKind {
    pub fn classify(source_url: &str) -> Self {
        if source_url.to_ascii_lowercase().ends_with(DOCUMENT_EXTENSION) {
            Self::Document
        } else {
            Self::Image
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }

    pub fn supports_transform(self) -> bool {
        matches!(self, Self::Image)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDescriptor {
    #[serde(default)]
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CertificateDescriptor {
    pub fn has_source(&self) -> bool {
        !self.source_url.trim().is_empty()
    }

    pub fn content_kind(&self) -> ContentKind {
        ContentKind::classify(&self.source_url)
    }

    pub fn display_title(&self) -> &str {
        non_blank(self.title.as_deref()).unwrap_or(DEFAULT_TITLE)
    }

    pub fn display_issuer(&self) -> &str {
        non_blank(self.issuer.as_deref()).unwrap_or_default()
    }

    pub fn display_description(&self) -> &str {
        non_blank(self.description.as_deref()).unwrap_or_default()
    }

    pub fn download_filename(&self) -> String {
        let title = self.display_title();
        let mut filename = String::with_capacity(title.len() + DOWNLOAD_SUFFIX.len());
        let mut in_whitespace = false;

        for character in title.chars() {
            if character.is_whitespace() {
                if !in_whitespace {
                    filename.push('_');
                }
                in_whitespace = true;
            } else {
                filename.push(character);
                in_whitespace = false;
            }
        }

        filename.push_str(DOWNLOAD_SUFFIX);
        filename
    }
}

#[cfg(test)]
impl CertificateDescriptor {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: None,
            issuer: None,
            description: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub fn document_viewer_url(source_url: &str) -> String {
    format!("{source_url}{DOCUMENT_VIEWER_PARAMS}")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
