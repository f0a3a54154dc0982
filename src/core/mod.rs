pub mod article;
pub mod completion;
pub mod credential;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod storage;
pub mod transcript;

pub use article::OutputFormat;
pub use completion::{OpenAiBackend, OpenAiSettings};
pub use credential::default_sources;
pub use pipeline::{GenerateConfig, Job, exit_code, generate};
pub use prompt::{PromptSettings, Tags};
pub use retry::RetryPolicy;
pub use transcript::YouTubeTranscripts;
