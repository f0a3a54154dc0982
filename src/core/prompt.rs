use crate::core::transcript::Transcript;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// Always attached to generated posts.
pub const AI_TAG: &str = "ai-generated";
pub const DEFAULT_MAX_TRANSCRIPT_CHARS: usize = 300_000;
pub const DATE_FORMAT: &str = "%d %b, %Y";

const SYSTEM_PROMPT: &str = "You are a technical writer who turns video transcripts into \
insightful, well structured blog posts written in Markdown.";

/// Post tags: trimmed, deduplicated and kept in lexicographic order so the
/// order they were typed in never changes the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// User tags followed by [`AI_TAG`], which appears exactly once.
    pub fn published(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .iter()
            .filter(|t| *t != AI_TAG)
            .map(str::to_string)
            .collect();
        tags.push(AI_TAG.to_string());
        tags
    }

    pub fn render(&self) -> String {
        self.published().join(", ")
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|tag| tag.as_ref().trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        )
    }
}

/// Logged (never raised) when the transcript had to be cut to fit the input budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptTooLong {
    pub original_chars: usize,
    pub kept_chars: usize,
}

impl fmt::Display for TranscriptTooLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transcript too long: kept the first {} of {} characters",
            self.kept_chars, self.original_chars
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub video_id: String,
    pub author: String,
    pub tags: Tags,
    pub instructions: String,
    pub prompt: String,
    pub truncation: Option<TranscriptTooLong>,
}

#[derive(Debug, Clone)]
pub struct PromptSettings {
    /// Language the post is written in.
    pub language: String,
    pub category: Option<String>,
    pub words: Option<u32>,
    /// Publication date shown to the model, already formatted.
    pub date: String,
    pub max_transcript_chars: usize,
    pub timestamps: bool,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            category: None,
            words: None,
            date: chrono::Local::now().format(DATE_FORMAT).to_string(),
            max_transcript_chars: DEFAULT_MAX_TRANSCRIPT_CHARS,
            timestamps: false,
        }
    }
}

pub struct PromptBuilder {
    settings: PromptSettings,
}

impl PromptBuilder {
    pub fn new(settings: PromptSettings) -> Self {
        Self { settings }
    }

    pub fn build(&self, transcript: &Transcript, author: &str, tags: &Tags) -> GenerationRequest {
        let text = if self.settings.timestamps {
            transcript.timestamped_lines().join("\n")
        } else {
            transcript.text()
        };

        let (text, truncation) = truncate_chars(&text, self.settings.max_transcript_chars);
        if let Some(truncation) = truncation {
            warn!(video_id = %transcript.video_id, "{truncation}");
        }

        GenerationRequest {
            video_id: transcript.video_id.clone(),
            author: author.to_string(),
            tags: tags.clone(),
            instructions: SYSTEM_PROMPT.to_string(),
            prompt: self.render(text, &transcript.video_id, author, tags, truncation.is_some()),
            truncation,
        }
    }

    fn render(&self, transcript: &str, video_id: &str, author: &str, tags: &Tags, truncated: bool) -> String {
        let settings = &self.settings;

        let mut notes = vec![
            "- Avoid generating text about any sponsorships.".to_string(),
            "- The generated Markdown should be in 80 columns.".to_string(),
            "- Start with a level-one heading holding the title of the post. Do not add a \
             front-matter block; it is added separately."
                .to_string(),
            format!(
                "- Insert somewhere in the generated Markdown text the video ID `{video_id}` \
                 with the following format (include the three backticks before and after the \
                 youtube directive):\n```{{youtube}} {video_id}\n```"
            ),
            format!(
                "- The post is written by {author}, dated {}, and tagged: {}.",
                settings.date,
                tags.render()
            ),
        ];
        if let Some(category) = &settings.category {
            notes.push(format!("- The post belongs to the category {category}."));
        }
        notes.push(format!("- Generate the content in {}.", settings.language));
        notes.push("- Include several sections.".to_string());
        if let Some(words) = settings.words {
            notes.push(format!("- Use at least {words} words."));
        }
        if truncated {
            notes.push(
                "- The transcript was cut short; do not speculate about what comes after it."
                    .to_string(),
            );
        }

        format!(
            "The following text is a transcript from a YouTube video. Write a post in\n\
             Markdown giving an insight about the content of the video:\n\
             ```\n{transcript}\n```\n\
             Notes:\n{}\n",
            notes.join("\n")
        )
    }
}

/// Keeps at most `max_chars` characters from the start of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> (&str, Option<TranscriptTooLong>) {
    match text.char_indices().nth(max_chars) {
        None => (text, None),
        Some((cut, _)) => (
            &text[..cut],
            Some(TranscriptTooLong {
                original_chars: text.chars().count(),
                kept_chars: max_chars,
            }),
        ),
    }
}
