use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
const CONF_FILE: &str = ".config/openai.token";

/// API key for the model provider. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Trims surrounding whitespace; blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// One place a credential may be found.
pub trait CredentialSource {
    fn describe(&self) -> String;

    /// `Ok(None)` when this source simply has nothing to offer.
    fn lookup(&self) -> Result<Option<Credential>>;
}

pub struct EnvVarSource {
    var: String,
}

impl EnvVarSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvVarSource {
    fn describe(&self) -> String {
        format!("environment variable {}", self.var)
    }

    fn lookup(&self) -> Result<Option<Credential>> {
        Ok(std::env::var(&self.var)
            .ok()
            .and_then(|value| Credential::parse(&value)))
    }
}

/// A file whose entire contents are the key.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn lookup(&self) -> Result<Option<Credential>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Credential::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join(CONF_FILE)
}

/// Environment first, then the well-known token file.
pub fn default_sources() -> Vec<Box<dyn CredentialSource>> {
    vec![
        Box::new(EnvVarSource::new(API_KEY_ENV)),
        Box::new(FileSource::new(default_config_path())),
    ]
}

/// Returns the first credential any source yields, in order.
pub fn resolve_credential(sources: &[Box<dyn CredentialSource>]) -> Result<Credential> {
    for source in sources {
        if let Some(credential) = source.lookup()? {
            debug!(source = %source.describe(), "using API credential");
            return Ok(credential);
        }
    }

    Err(Error::CredentialMissing {
        searched: sources.iter().map(|source| source.describe()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Fixed(Option<&'static str>);

    impl CredentialSource for Fixed {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn lookup(&self) -> Result<Option<Credential>> {
            Ok(self.0.and_then(Credential::parse))
        }
    }

    #[test]
    fn first_source_wins() {
        let sources: Vec<Box<dyn CredentialSource>> =
            vec![Box::new(Fixed(Some("from-env"))), Box::new(Fixed(Some("from-file")))];
        assert_eq!(resolve_credential(&sources).unwrap().expose(), "from-env");
    }

    #[test]
    fn falls_through_empty_sources() {
        let sources: Vec<Box<dyn CredentialSource>> =
            vec![Box::new(Fixed(None)), Box::new(Fixed(Some("  sk-file \n")))];
        assert_eq!(resolve_credential(&sources).unwrap().expose(), "sk-file");
    }

    #[test]
    fn missing_everywhere_is_credential_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sources: Vec<Box<dyn CredentialSource>> = vec![
            Box::new(EnvVarSource::new("YT_INSIGHT_TEST_NEVER_SET_KEY")),
            Box::new(FileSource::new(dir.path().join("openai.token"))),
        ];
        let err = resolve_credential(&sources).unwrap_err();
        assert!(matches!(err, Error::CredentialMissing { .. }));
        assert_eq!(
            err.to_string(),
            format!(
                "Missing OpenAI key: looked in environment variable YT_INSIGHT_TEST_NEVER_SET_KEY, file {}",
                dir.path().join("openai.token").display()
            )
        );
    }

    #[test]
    fn file_source_trims_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sk-test-123").unwrap();

        let credential = FileSource::new(file.path()).lookup().unwrap().unwrap();
        assert_eq!(credential.expose(), "sk-test-123");
    }

    #[test]
    fn blank_file_counts_as_absent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();
        assert!(FileSource::new(file.path()).lookup().unwrap().is_none());
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential = Credential::parse("sk-secret").unwrap();
        assert_eq!(format!("{credential:?}"), "Credential(***)");
    }
}
