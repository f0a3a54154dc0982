use crate::core::article::{Article, ArticleAssembler, OutputFormat};
use crate::core::completion::{CompletionBackend, CompletionClient};
use crate::core::credential::{Credential, CredentialSource, resolve_credential};
use crate::core::prompt::{PromptBuilder, PromptSettings, Tags};
use crate::core::retry::RetryPolicy;
use crate::core::storage::StorageService;
use crate::core::transcript::{TranscriptResolver, TranscriptSource};
use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Stage {
    #[display("startup")]
    Startup,
    #[display("resolving transcript")]
    ResolvingTranscript,
    #[display("building prompt")]
    BuildingPrompt,
    #[display("generating article")]
    Completing,
    #[display("assembling article")]
    Assembling,
    #[display("writing article")]
    Writing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ResolvingTranscript,
    BuildingPrompt,
    Completing,
    Assembling,
    Done,
    Failed { stage: Stage, kind: ErrorKind },
}

impl PipelineState {
    fn stage(self) -> Option<Stage> {
        match self {
            PipelineState::ResolvingTranscript => Some(Stage::ResolvingTranscript),
            PipelineState::BuildingPrompt => Some(Stage::BuildingPrompt),
            PipelineState::Completing => Some(Stage::Completing),
            PipelineState::Assembling => Some(Stage::Assembling),
            PipelineState::Idle | PipelineState::Done | PipelineState::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Display)]
#[display("{stage} failed: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: Error,
}

impl PipelineFailure {
    pub fn new(stage: Stage, error: Error) -> Self {
        Self { stage, error }
    }

    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// What to write about.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: String,
    pub author: String,
    pub tags: Tags,
}

/// One video, one article. A pipeline cannot be rerun once it has left `Idle`.
pub struct Pipeline<S, B> {
    resolver: TranscriptResolver<S>,
    prompts: PromptBuilder,
    client: CompletionClient<B>,
    assembler: ArticleAssembler,
    state: PipelineState,
}

impl<S: TranscriptSource, B: CompletionBackend> Pipeline<S, B> {
    pub fn new(
        resolver: TranscriptResolver<S>,
        prompts: PromptBuilder,
        client: CompletionClient<B>,
        assembler: ArticleAssembler,
    ) -> Self {
        Self {
            resolver,
            prompts,
            client,
            assembler,
            state: PipelineState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
    }

    fn fail(&mut self, error: Error) -> PipelineFailure {
        let stage = self.state.stage().unwrap_or(Stage::Startup);
        self.enter(PipelineState::Failed {
            stage,
            kind: error.kind(),
        });
        PipelineFailure::new(stage, error)
    }

    pub async fn run(&mut self, job: &Job) -> Result<Article, PipelineFailure> {
        if self.state != PipelineState::Idle {
            return Err(PipelineFailure::new(
                Stage::Startup,
                Error::custom("pipeline has already run"),
            ));
        }

        self.enter(PipelineState::ResolvingTranscript);
        let outcome = self.resolver.resolve(&job.source).await;
        let transcript = outcome.map_err(|e| self.fail(e))?;

        self.enter(PipelineState::BuildingPrompt);
        let request = self.prompts.build(&transcript, &job.author, &job.tags);
        drop(transcript);

        self.enter(PipelineState::Completing);
        let outcome = self.client.complete(&request).await;
        let result = outcome.map_err(|e| self.fail(e))?;

        self.enter(PipelineState::Assembling);
        let article = self
            .assembler
            .assemble(result, &request.video_id, &job.author, &job.tags)
            .map_err(|e| self.fail(e))?;

        self.enter(PipelineState::Done);
        Ok(article)
    }

    /// Like [`Pipeline::run`], but aborts the in-flight stage as soon as
    /// `shutdown` resolves.
    pub async fn run_until<F>(&mut self, job: &Job, shutdown: F) -> Result<Article, PipelineFailure>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            outcome = self.run(job) => Some(outcome),
            () = shutdown => None,
        };

        match outcome {
            Some(outcome) => outcome,
            None => Err(self.fail(Error::Cancelled)),
        }
    }
}

/// Everything a single generation run needs, already parsed.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub job: Job,
    pub destination: PathBuf,
    pub format: OutputFormat,
    pub prompt: PromptSettings,
    pub retry: RetryPolicy,
}

#[derive(Debug)]
pub struct Generated {
    pub path: PathBuf,
    pub document: String,
}

/// Resolves the credential, runs the pipeline and writes the article.
///
/// `connect` is only called once a credential has been found, so nothing
/// touches the network when the key is missing.
pub async fn generate<S, B, C, F>(
    config: &GenerateConfig,
    credentials: &[Box<dyn CredentialSource>],
    transcripts: S,
    connect: C,
    shutdown: F,
) -> Result<Generated, PipelineFailure>
where
    S: TranscriptSource,
    B: CompletionBackend,
    C: FnOnce(&Credential) -> B,
    F: Future<Output = ()>,
{
    let credential =
        resolve_credential(credentials).map_err(|e| PipelineFailure::new(Stage::Startup, e))?;

    let mut pipeline = Pipeline::new(
        TranscriptResolver::new(transcripts, config.retry.clone()),
        PromptBuilder::new(config.prompt.clone()),
        CompletionClient::new(connect(&credential), config.retry.clone()),
        ArticleAssembler::new(config.prompt.category.clone()),
    );

    let article = pipeline.run_until(&config.job, shutdown).await?;

    let document = article
        .render(config.format)
        .map_err(|e| PipelineFailure::new(Stage::Writing, e))?;
    let path = StorageService::save_article(&config.destination, &document)
        .await
        .map_err(|e| PipelineFailure::new(Stage::Writing, e))?;

    info!(path = %path.display(), "article saved");
    Ok(Generated { path, document })
}

/// Exit status for a finished run.
pub fn exit_code(outcome: &Result<Generated, PipelineFailure>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(failure) => failure.exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::completion::tests::{Scripted, ScriptedBackend};
    use crate::core::transcript::tests::{Fetch, ScriptedSource};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct StaticKey(Option<&'static str>);

    impl CredentialSource for StaticKey {
        fn describe(&self) -> String {
            "static".to_string()
        }

        fn lookup(&self) -> crate::error::Result<Option<Credential>> {
            Ok(self.0.and_then(Credential::parse))
        }
    }

    fn with_key() -> Vec<Box<dyn CredentialSource>> {
        vec![Box::new(StaticKey(Some("sk-test")))]
    }

    fn config(destination: PathBuf) -> GenerateConfig {
        GenerateConfig {
            job: Job {
                source: "https://www.youtube.com/watch?v=JpviQnH3Hdw".to_string(),
                author: "Jean-Pierre Chauvel".to_string(),
                tags: ["cat", "siamese"].into_iter().collect(),
            },
            destination,
            format: OutputFormat::Markdown,
            prompt: PromptSettings {
                date: "17 Oct, 2026".to_string(),
                ..PromptSettings::default()
            },
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                multiplier: 2.0,
                attempt_timeout: Duration::from_secs(5),
            },
        }
    }

    fn cat_video() -> ScriptedSource {
        ScriptedSource::new(vec![Fetch::Lines(&[
            "siamese cats are vocal",
            "they like warm places",
        ])])
    }

    fn pipeline(source: ScriptedSource, backend: ScriptedBackend) -> Pipeline<ScriptedSource, ScriptedBackend> {
        let config = config(PathBuf::from("unused.md"));
        Pipeline::new(
            TranscriptResolver::new(source, config.retry.clone()),
            PromptBuilder::new(config.prompt),
            CompletionClient::new(backend, config.retry),
            ArticleAssembler::default(),
        )
    }

    #[tokio::test]
    async fn writes_the_article_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("article.md");
        let backend = ScriptedBackend::new(vec![Scripted::Body("This video explores feline behavior...")]);
        let calls = backend.calls();

        let outcome = generate(
            &config(destination.clone()),
            &with_key(),
            cat_video(),
            |_: &Credential| backend,
            std::future::pending(),
        )
        .await;

        assert_eq!(exit_code(&outcome), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let written = std::fs::read_to_string(&destination).unwrap();
        assert_eq!(written, outcome.unwrap().document);
        assert!(written.starts_with("---\nblogpost: true\n"));
        assert!(written.contains("author: Jean-Pierre Chauvel\n"));
        assert!(written.contains("tags: cat, siamese, ai-generated\n"));
        assert!(written.contains("This video explores feline behavior..."));
    }

    #[tokio::test]
    async fn missing_credential_stops_before_any_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("article.md");
        let backend = ScriptedBackend::new(vec![Scripted::Body("unused")]);
        let calls = backend.calls();
        let source = cat_video();
        let fetches = source.calls();
        let credentials: Vec<Box<dyn CredentialSource>> = vec![Box::new(StaticKey(None))];

        let mut connected = false;
        let outcome = generate(
            &config(destination.clone()),
            &credentials,
            source,
            |_: &Credential| {
                connected = true;
                backend
            },
            std::future::pending(),
        )
        .await;

        let failure = outcome.as_ref().unwrap_err();
        assert!(matches!(failure.error, Error::CredentialMissing { .. }));
        assert_eq!(failure.stage, Stage::Startup);
        assert_eq!(exit_code(&outcome), 4);
        assert!(!connected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn empty_generation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("article.md");

        let outcome = generate(
            &config(destination.clone()),
            &with_key(),
            cat_video(),
            |_: &Credential| ScriptedBackend::new(vec![Scripted::Body("  \n ")]),
            std::future::pending(),
        )
        .await;

        let failure = outcome.as_ref().unwrap_err();
        assert!(matches!(failure.error, Error::EmptyGeneration));
        assert_eq!(failure.stage, Stage::Assembling);
        assert_eq!(exit_code(&outcome), 8);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn transitions_to_done() {
        let mut pipeline = pipeline(cat_video(), ScriptedBackend::new(vec![Scripted::Body("# Cats\nbody")]));
        let job = config(PathBuf::new()).job;

        let article = pipeline.run(&job).await.unwrap();

        assert_eq!(article.title, "Cats");
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn records_the_failing_stage() {
        let source = ScriptedSource::new(vec![Fetch::Unavailable("captions disabled")]);
        let backend = ScriptedBackend::new(vec![Scripted::Body("unused")]);
        let calls = backend.calls();
        let mut pipeline = pipeline(source, backend);

        let failure = pipeline.run(&config(PathBuf::new()).job).await.unwrap_err();

        assert_eq!(failure.stage, Stage::ResolvingTranscript);
        assert_eq!(
            pipeline.state(),
            PipelineState::Failed {
                stage: Stage::ResolvingTranscript,
                kind: ErrorKind::TranscriptUnavailable,
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            failure.to_string(),
            "resolving transcript failed: Transcript unavailable for `JpviQnH3Hdw`: captions disabled"
        );
    }

    #[tokio::test]
    async fn model_rejection_fails_the_completing_stage() {
        let mut pipeline = pipeline(cat_video(), ScriptedBackend::new(vec![Scripted::Rejected]));

        let failure = pipeline.run(&config(PathBuf::new()).job).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Completing);
        assert_eq!(failure.exit_code(), 6);
    }

    #[tokio::test]
    async fn cannot_run_twice() {
        let mut pipeline = pipeline(cat_video(), ScriptedBackend::new(vec![Scripted::Body("body")]));
        let job = config(PathBuf::new()).job;

        pipeline.run(&job).await.unwrap();
        let failure = pipeline.run(&job).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Startup);
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_in_flight_stage() {
        struct Hanging;

        #[async_trait::async_trait]
        impl TranscriptSource for Hanging {
            async fn fetch(&self, _video_id: &str) -> crate::error::Result<crate::core::transcript::Transcript> {
                std::future::pending().await
            }
        }

        let config = config(PathBuf::new());
        let mut pipeline = Pipeline::new(
            TranscriptResolver::new(Hanging, config.retry.clone()),
            PromptBuilder::new(config.prompt.clone()),
            CompletionClient::new(ScriptedBackend::new(vec![Scripted::Body("unused")]), config.retry.clone()),
            ArticleAssembler::default(),
        );

        let failure = pipeline
            .run_until(&config.job, tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, Error::Cancelled));
        assert_eq!(failure.exit_code(), 130);
        assert_eq!(
            pipeline.state(),
            PipelineState::Failed {
                stage: Stage::ResolvingTranscript,
                kind: ErrorKind::Cancelled,
            }
        );
    }
}
