use crate::core::retry::{RetryPolicy, with_retry};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info, instrument};
use yt_transcript_rs::errors::{CouldNotRetrieveTranscript, CouldNotRetrieveTranscriptReason};
use yt_transcript_rs::{FetchedTranscript, api::YouTubeTranscriptApi};

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub video_id: String,
    pub language: String,
    pub language_code: String,
    pub is_generated: bool,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Plain text, one caption line per row.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn timestamped_lines(&self) -> Vec<String> {
        self.segments
            .iter()
            .map(|segment| {
                let start = format_timestamp(segment.start);
                let end = format_timestamp(segment.start + segment.duration);
                format!("[{start} - {end}] {}", segment.text.trim())
            })
            .collect()
    }

    pub fn is_blank(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }
}

impl From<FetchedTranscript> for Transcript {
    fn from(fetched: FetchedTranscript) -> Self {
        Self {
            segments: fetched
                .snippets
                .into_iter()
                .map(|snippet| TranscriptSegment {
                    text: snippet.text,
                    start: snippet.start,
                    duration: snippet.duration,
                })
                .collect(),
            video_id: fetched.video_id,
            language: fetched.language,
            language_code: fetched.language_code,
            is_generated: fetched.is_generated,
        }
    }
}

/// Something that can download captions for an already validated video ID.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<Transcript>;
}

pub struct YouTubeTranscripts {
    api: YouTubeTranscriptApi,
    languages: Vec<String>,
    preserve_formatting: bool,
}

impl YouTubeTranscripts {
    pub fn new(languages: Vec<String>, preserve_formatting: bool) -> Result<Self> {
        let api = YouTubeTranscriptApi::new(None, None, None)
            .map_err(|e| Error::custom(format!("Failed to initialise YouTube client: {e}")))?;
        Ok(Self {
            api,
            languages,
            preserve_formatting,
        })
    }
}

#[async_trait]
impl TranscriptSource for YouTubeTranscripts {
    async fn fetch(&self, video_id: &str) -> Result<Transcript> {
        let languages: Vec<&str> = self.languages.iter().map(String::as_str).collect();

        self.api
            .fetch_transcript(video_id, &languages, self.preserve_formatting)
            .await
            .map(Transcript::from)
            .map_err(|e| classify_fetch_error(video_id, e))
    }
}

/// Network failures and YouTube throttling are worth retrying; anything about
/// the video itself is not.
fn classify_fetch_error(video_id: &str, err: CouldNotRetrieveTranscript) -> Error {
    match &err.reason {
        Some(CouldNotRetrieveTranscriptReason::YouTubeRequestFailed(_)) => {
            Error::Transport(format!("YouTube request failed: {err}"))
        }
        Some(
            CouldNotRetrieveTranscriptReason::IpBlocked(_)
            | CouldNotRetrieveTranscriptReason::RequestBlocked(_),
        ) => Error::Transport(format!("YouTube is throttling requests: {err}")),
        _ => Error::unavailable(video_id, err.to_string()),
    }
}

/// Turns a user supplied video source into a transcript.
pub struct TranscriptResolver<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: TranscriptSource> TranscriptResolver<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, video_source: &str) -> Result<Transcript> {
        let video_id = extract_video_id(video_source).ok_or_else(|| {
            Error::unavailable(video_source, "not a recognisable YouTube URL or video ID")
        })?;
        debug!(%video_id, "resolved video id");

        let transcript = with_retry(&self.policy, "transcript fetch", |_| {
            self.source.fetch(&video_id)
        })
        .await?;

        if transcript.is_blank() {
            return Err(Error::unavailable(&video_id, "transcript has no text"));
        }

        info!(
            %video_id,
            language = %transcript.language,
            code = %transcript.language_code,
            generated = transcript.is_generated,
            segments = transcript.segments.len(),
            "fetched transcript"
        );
        Ok(transcript)
    }
}

fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1_000;
    let millis = total_millis % 1_000;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
    } else {
        format!("{minutes:02}:{secs:02}.{millis:03}")
    }
}

const PATH_MARKERS: &[&str] = &["youtu.be/", "/shorts/", "/embed/", "/live/"];

pub fn extract_video_id(source: &str) -> Option<String> {
    let source = source.trim();

    let raw_id = if let Some(query) = source.split_once('?').map(|(_, q)| q) {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("v="))
            .map(|v| v.split('#').next().unwrap_or(v))
            .or_else(|| path_segment_id(source))
    } else {
        path_segment_id(source)
    };

    sanitize_video_id(raw_id.unwrap_or(source)).ok()
}

fn path_segment_id(source: &str) -> Option<&str> {
    PATH_MARKERS.iter().find_map(|marker| {
        source
            .split_once(marker)
            .map(|(_, rest)| rest.split(['?', '&', '/', '#']).next().unwrap_or(rest))
    })
}

const MAX_VIDEO_ID_LEN: usize = 128;

/// Ensure a video identifier is safe for downstream use (API calls, prompt text).
/// Only ASCII alphanumeric characters plus `_` and `-` are allowed.
pub fn sanitize_video_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(Error::custom("Video ID cannot be empty"));
    }

    if trimmed.len() > MAX_VIDEO_ID_LEN {
        return Err(Error::custom("Video ID is unexpectedly long"));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(Error::custom(
            "Video ID contains unsupported characters; expected only letters, numbers, '-' or '_'",
        ));
    }

    Ok(trimmed.to_string())
}
