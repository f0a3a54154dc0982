use crate::core::completion::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};
use crate::core::prompt::{DATE_FORMAT, DEFAULT_MAX_TRANSCRIPT_CHARS};
use crate::core::{GenerateConfig, Job, OpenAiSettings, OutputFormat, PromptSettings, RetryPolicy, Tags};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "yt-insight")]
#[command(about = "A blog post generator that writes YouTube video insights using OpenAI's API")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// The YouTube video URL or video ID
    #[arg(short, long)]
    pub source: String,

    /// The output file of the post (Markdown by default)
    #[arg(short, long)]
    pub destination: PathBuf,

    /// The name of the author of the post
    #[arg(short, long)]
    pub author: String,

    /// The tags of the post
    #[arg(short = 't', long = "tags", num_args = 1..)]
    pub tags: Vec<String>,

    /// More tags, given positionally
    #[arg(value_name = "TAG")]
    pub extra_tags: Vec<String>,

    /// The language of the resulting post
    #[arg(short, long, default_value = "English")]
    pub language: String,

    /// The category of the post
    #[arg(short, long)]
    pub category: Option<String>,

    /// The minimum number of words for the post
    #[arg(short, long)]
    pub words: Option<u32>,

    /// Model used to write the post
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Alternative OpenAI-compatible API base URL
    #[arg(long)]
    pub api_base: Option<String>,

    /// Upper bound on generated tokens
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_TOKENS)]
    pub max_output_tokens: u32,

    /// Preferred transcript languages (comma-separated)
    #[arg(long, default_value = "en")]
    pub transcript_languages: String,

    /// Preserve formatting in transcript
    #[arg(long)]
    pub preserve_formatting: bool,

    /// Send caption timestamps to the model
    #[arg(long)]
    pub timestamps: bool,

    /// Transcript characters kept before truncating the end
    #[arg(long, default_value_t = DEFAULT_MAX_TRANSCRIPT_CHARS)]
    pub max_transcript_chars: usize,

    /// Per-attempt network timeout in seconds
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Attempts per network call, including the first one
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Output document format
    #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
    pub format: OutputFormat,

    /// Do not echo the article to stdout
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Positional and `-t` tags merged into one normalized set.
    pub fn tags(&self) -> Tags {
        self.tags.iter().chain(&self.extra_tags).collect()
    }

    pub fn transcript_languages(&self) -> Vec<String> {
        let languages: Vec<String> = self
            .transcript_languages
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if languages.is_empty() {
            vec!["en".to_string()]
        } else {
            languages
        }
    }

    pub fn openai_settings(&self) -> OpenAiSettings {
        OpenAiSettings {
            model: self.model.clone(),
            api_base: self.api_base.clone(),
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub fn generate_config(&self) -> GenerateConfig {
        GenerateConfig {
            job: Job {
                source: self.source.clone(),
                author: self.author.clone(),
                tags: self.tags(),
            },
            destination: self.destination.clone(),
            format: self.format,
            prompt: PromptSettings {
                language: self.language.clone(),
                category: self.category.clone(),
                words: self.words,
                date: chrono::Local::now().format(DATE_FORMAT).to_string(),
                max_transcript_chars: self.max_transcript_chars,
                timestamps: self.timestamps,
            },
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                attempt_timeout: Duration::from_secs(self.timeout),
                ..RetryPolicy::default()
            },
        }
    }
}
