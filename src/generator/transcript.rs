//! YouTube transcript lookup for the fast generation path.

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("not a YouTube video reference: {0}")]
    NotYoutube(String),
    #[error("no transcript available for video {0}")]
    Unavailable(String),
    #[error("transcript request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Source of plain-text transcripts for a content reference.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, content_reference: &str) -> Result<String, TranscriptError>;
}

/// Fetches caption tracks from YouTube's timed-text endpoint.
#[derive(Debug, Clone)]
pub struct YoutubeTranscripts {
    http: reqwest::Client,
    base_url: String,
    language: String,
}

impl Default for YoutubeTranscripts {
    fn default() -> Self {
        Self::new()
    }
}

impl YoutubeTranscripts {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: YOUTUBE_BASE_URL.to_string(),
            language: "en".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscripts {
    async fn fetch(&self, content_reference: &str) -> Result<String, TranscriptError> {
        let id = video_id(content_reference)
            .ok_or_else(|| TranscriptError::NotYoutube(content_reference.to_string()))?;

        let url = format!("{}/api/timedtext", self.base_url.trim_end_matches('/'));
        let body = self
            .http
            .get(url)
            .query(&[("v", id.as_str()), ("lang", self.language.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let transcript = join_cues(&body);
        if transcript.is_empty() {
            return Err(TranscriptError::Unavailable(id));
        }
        Ok(transcript)
    }
}

/// Extract the 11-character video id from the usual YouTube URL shapes.
pub fn video_id(reference: &str) -> Option<String> {
    let url = Url::parse(reference.trim()).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            "shorts" | "embed" | "live" | "v" => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    }?;

    let valid = candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(candidate)
}

/// Join the text of every `<text>` cue in a timed-text document.
///
/// Malformed markup yields whatever cues could be recovered, possibly none.
fn join_cues(xml: &str) -> String {
    let document = Html::parse_fragment(xml);
    let Ok(selector) = Selector::parse("text") else {
        return String::new();
    };

    document
        .select(&selector)
        // Direct text only: a self-closing cue parses as an open element
        // that swallows the cues after it.
        .map(|cue| {
            cue.children()
                .filter_map(|node| node.value().as_text())
                .map(|text| &**text)
                .collect::<String>()
        })
        .map(|cue| unescape_cue(cue.trim()))
        .filter(|cue| !cue.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Caption tracks are often escaped twice, so `&amp;#39;` survives the first
/// parse as `&#39;`.
fn unescape_cue(cue: &str) -> String {
    if !cue.contains('&') {
        return cue.to_string();
    }
    let fragment = Html::parse_fragment(&cue.replace('<', "&lt;"));
    fragment.root_element().text().collect::<String>().trim().to_string()
}
