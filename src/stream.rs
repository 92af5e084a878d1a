//! Picks a playable URL out of the episode structure returned by the source.

use serde::{Deserialize, Serialize};

/// Episode playback candidates as the upstream describes them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCandidate {
    pub chapter_id: String,
    #[serde(default)]
    pub chapter_name: String,
    #[serde(default, alias = "cdnList")]
    pub cdn_groups: Vec<CdnGroup>,
}

/// One CDN's renditions, best first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CdnGroup {
    #[serde(default, alias = "videoPathList")]
    pub qualities: Vec<QualitySource>,
}

/// A rendition is either a bare URL or a labelled object carrying one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualitySource {
    Url(String),
    Labelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<u32>,
        #[serde(rename = "videoPath", alias = "videoUrl")]
        video_path: String,
    },
}

impl QualitySource {
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Labelled { video_path, .. } => video_path,
        }
    }
}

impl From<&str> for QualitySource {
    fn from(url: &str) -> Self {
        Self::Url(url.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    /// `None` when the candidate exists but carries nothing playable.
    pub video_url: Option<String>,
    /// Every rendition of the first CDN group, in source order.
    pub qualities: Vec<String>,
}

/// Selects `cdn_groups[0].qualities[0]` and surfaces the first group's list.
pub fn resolve(candidate: &StreamCandidate) -> ResolvedStream {
    let qualities: Vec<String> = candidate
        .cdn_groups
        .first()
        .map(|group| {
            group
                .qualities
                .iter()
                .map(|quality| quality.url().to_owned())
                .collect()
        })
        .unwrap_or_default();

    ResolvedStream {
        video_url: qualities.first().cloned(),
        qualities,
    }
}
