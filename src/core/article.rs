use crate::core::completion::{GenerationResult, TokenUsage};
use crate::core::prompt::{DATE_FORMAT, Tags};
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub video_id: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub generated_at: DateTime<Local>,
    pub body: String,
}

impl Article {
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Markdown => Ok(self.to_markdown()),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)? + "\n"),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut doc = String::from("---\nblogpost: true\n");
        doc.push_str(&format!("title: {}\n", yaml_scalar(&self.title)));
        doc.push_str(&format!("date: {}\n", self.generated_at.format(DATE_FORMAT)));
        doc.push_str(&format!("author: {}\n", yaml_scalar(&self.author)));
        if let Some(category) = &self.category {
            doc.push_str(&format!("category: {}\n", yaml_scalar(category)));
        }
        doc.push_str(&format!("tags: {}\n", yaml_scalar(&self.tags.join(", "))));
        doc.push_str("---\n\n");
        doc.push_str(self.body.trim());
        doc.push('\n');
        doc
    }
}

/// Wraps generated text with the post metadata.
#[derive(Debug, Clone, Default)]
pub struct ArticleAssembler {
    category: Option<String>,
}

impl ArticleAssembler {
    pub fn new(category: Option<String>) -> Self {
        Self { category }
    }

    pub fn assemble(&self, result: GenerationResult, video_id: &str, author: &str, tags: &Tags) -> Result<Article> {
        self.assemble_at(result, video_id, author, tags, Local::now())
    }

    pub fn assemble_at(
        &self,
        result: GenerationResult,
        video_id: &str,
        author: &str,
        tags: &Tags,
        generated_at: DateTime<Local>,
    ) -> Result<Article> {
        let body = strip_front_matter(&result.body).trim();
        if body.is_empty() {
            return Err(Error::EmptyGeneration);
        }

        Ok(Article {
            title: extract_title(body)
                .unwrap_or_else(|| format!("Insights from YouTube video {video_id}")),
            author: author.to_string(),
            category: self.category.clone(),
            tags: tags.published(),
            video_id: video_id.to_string(),
            model: result.model,
            usage: result.usage,
            generated_at,
            body: body.to_string(),
        })
    }
}

/// Drops a leading `---` block if the model wrote its own front-matter. A block
/// without any `key:` line is a horizontal rule and is kept.
fn strip_front_matter(body: &str) -> &str {
    let trimmed = body.trim_start();
    let Some(rest) = trimmed.strip_prefix("---") else {
        return body;
    };
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return body;
    };

    let mut offset = 0;
    let mut has_key = false;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() == "---" {
            return if has_key { &rest[offset..] } else { body };
        }
        has_key |= is_metadata_line(line);
    }
    body
}

fn is_metadata_line(line: &str) -> bool {
    let Some((key, value)) = line.trim_end().split_once(':') else {
        return false;
    };
    !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        && (value.is_empty() || value.starts_with(' '))
}

fn extract_title(body: &str) -> Option<String> {
    let mut in_fence = false;
    for line in body.lines() {
        let line = line.trim();
        if line.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(title) = line.strip_prefix("# ") {
            let title = title.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

/// Plain scalars stay bare; anything YAML could misread is double-quoted.
fn yaml_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value != value.trim()
        || value.starts_with(['-', '?', '!', '&', '*', '[', ']', '{', '}', '|', '>', '@', '`', '"', '\'', '%', '#'])
        || value.contains(": ")
        || value.contains(" #")
        || value.ends_with(':')
        || value.chars().any(char::is_control);

    if needs_quotes {
        serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
    } else {
        value.to_string()
    }
}
