use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

pub struct StorageService;

impl StorageService {
    /// Writes `content` to `destination`, replacing any existing file.
    ///
    /// The document is first written next to the destination and then renamed
    /// over it, so an interrupted run never leaves a half-written article.
    pub async fn save_article(destination: &Path, content: &str) -> Result<PathBuf> {
        let path = expand_home(destination);
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::custom(format!("Destination {} is not a file path", path.display())))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory(parent).await?;
        }

        let mut temp_name = std::ffi::OsString::from(".");
        temp_name.push(file_name);
        temp_name.push(format!(".{}.tmp", std::process::id()));
        let temp_path = path.with_file_name(temp_name);

        if let Err(e) = fs::write(&temp_path, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = content.len(), "article written");
        Ok(path)
    }
}

async fn ensure_directory(path: &Path) -> Result<()> {
    if !fs::try_exists(path).await? {
        fs::create_dir_all(path).await?;
    }
    Ok(())
}
