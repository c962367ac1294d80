//! YouTube video-id parsing and transcript retrieval.
//!
//! The default [`YouTubeTranscriptClient`] reads the caption track list
//! embedded in the watch page (`"captionTracks": [...]`), picks the track in
//! the configured language (falling back to the first one), and downloads
//! its timed-text XML. Each `<text>` element becomes one snippet.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

use crate::config::TranscriptConfig;
use crate::response::extract_json;

static VIDEO_ID_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([^&\n?#]+)")
            .expect("valid video id regex"),
        Regex::new(r"youtube\.com/watch\?.*v=([^&\n?#]+)").expect("valid video id regex"),
    ]
});

/// Video id from a `watch?v=`, `watch?...&v=`, `youtu.be/` or `embed/` URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .map(|caps| caps[1].to_string())
}

/// Full transcript text: snippets joined with single spaces.
pub fn transcript_text(snippets: &[String]) -> String {
    snippets.join(" ")
}

/// Fetches the caption snippets of a video, in playback order.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
}

pub struct YouTubeTranscriptClient {
    language: String,
    client: reqwest::Client,
}

impl YouTubeTranscriptClient {
    pub fn new(config: &TranscriptConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            language: config.language.clone(),
            client,
        })
    }

    pub fn shared(config: &TranscriptConfig) -> Result<Arc<dyn TranscriptFetcher>> {
        Ok(Arc::new(Self::new(config)?))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", &self.language)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            bail!("YouTube returned {} for {}", status, url);
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl TranscriptFetcher for YouTubeTranscriptClient {
    async fn fetch(&self, video_id: &str) -> Result<Vec<String>> {
        let watch_url = format!("https://www.youtube.com/watch?v={}", video_id);
        let page = self
            .get_text(&watch_url)
            .await
            .context("Failed to fetch transcript")?;
        let tracks = parse_caption_tracks(&page)
            .with_context(|| format!("Failed to fetch transcript for {}", video_id))?;
        let track = tracks
            .iter()
            .find(|t| t.language_code == self.language)
            .or_else(|| tracks.first())
            .ok_or_else(|| anyhow::anyhow!("Failed to fetch transcript: no caption tracks"))?;
        debug!(video_id, language = %track.language_code, "fetching caption track");

        let xml = self
            .get_text(&track.base_url)
            .await
            .context("Failed to fetch transcript")?;
        parse_timedtext(&xml).context("Failed to fetch transcript")
    }
}

fn parse_caption_tracks(page: &str) -> Result<Vec<CaptionTrack>> {
    const MARKER: &str = "\"captionTracks\":";
    let Some(pos) = page.find(MARKER) else {
        bail!("transcripts are disabled or unavailable for this video");
    };
    let json = extract_json(&page[pos + MARKER.len()..])
        .ok_or_else(|| anyhow::anyhow!("malformed caption track list"))?;
    Ok(serde_json::from_str(json)?)
}

/// Text of every `<text>` element, entity-decoded and trimmed.
fn parse_timedtext(xml: &str) -> Result<Vec<String>> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut snippets = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"text" => {
                current = Some(String::new());
            }
            Event::Text(t) => {
                if let Some(buf) = current.as_mut() {
                    let once = t.unescape()?;
                    // Caption text is HTML-escaped inside the XML escaping.
                    match quick_xml::escape::unescape(&once) {
                        Ok(twice) => buf.push_str(&twice),
                        Err(_) => buf.push_str(&once),
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"text" => {
                if let Some(text) = current.take() {
                    let text = text.replace('\n', " ");
                    let text = text.trim();
                    if !text.is_empty() {
                        snippets.push(text.to_string());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(snippets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_from_common_url_shapes() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://youtu.be/dQw4w9WgXcQ?t=42", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ"),
            ("https://www.youtube.com/watch?feature=share&v=abc123#t=1", "abc123"),
            ("https://www.youtube.com/watch?v=abc&list=PL1", "abc"),
        ];
        for (url, id) in cases {
            assert_eq!(extract_video_id(url).as_deref(), Some(id), "{}", url);
        }
    }

    #[test]
    fn non_youtube_urls_have_no_id() {
        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
        assert_eq!(extract_video_id("not a url"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn transcript_text_joins_with_spaces() {
        let snippets = vec!["hello".to_string(), "world".to_string()];
        assert_eq!(transcript_text(&snippets), "hello world");
    }

    #[test]
    fn caption_tracks_found_in_page() {
        let page = r#"var x = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=de","languageCode":"de"},{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en","languageCode":"en"}],"audioTracks":[]}}};"#;
        let tracks = parse_caption_tracks(page).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].language_code, "en");
        assert!(tracks[1].base_url.ends_with("&lang=en"));
        assert!(parse_caption_tracks("<html>no captions</html>").is_err());
    }

    #[test]
    fn timedtext_snippets_are_decoded() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.0" dur="1.5">Hello &amp;amp; welcome</text><text start="1.5" dur="2.0">it&amp;#39;s
time</text><text start="3.5" dur="1.0"></text></transcript>"#;
        let snippets = parse_timedtext(xml).unwrap();
        assert_eq!(snippets, vec!["Hello & welcome", "it's time"]);
    }
}
