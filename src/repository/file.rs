//! Directory-backed config repository with format-by-extension parsing.
//!
//! [`FileRepository`] serves every config file directly under one
//! directory. JSON is always supported; YAML and TOML are gated by the
//! `yaml` and `toml` features. Change detection uses filesystem
//! modification times, so the reader only re-parses files that were
//! actually touched.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;

use super::{ConfigRepository, ConfigTree};
use crate::error::{BoxError, CuratorError};

fn is_supported_extension(ext: &str) -> bool {
    match ext {
        "json" => true,

        #[cfg(feature = "yaml")]
        "yaml" | "yml" => true,

        #[cfg(feature = "toml")]
        "toml" => true,

        _ => false,
    }
}

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<ConfigTree, CuratorError> {
    match ext {
        "json" => serde_json::from_str(content).map_err(|e| CuratorError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| CuratorError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| CuratorError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(CuratorError::UnsupportedFormat(other.to_string())),
    }
}

pub struct FileRepository {
    dir: PathBuf,
}

impl FileRepository {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_content(&self, path: &Path) -> Result<String, CuratorError> {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CuratorError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CuratorError::Io(e)
            }
        })
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

#[async_trait]
impl ConfigRepository for FileRepository {
    async fn list_paths(&self) -> Result<Vec<String>, BoxError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if is_supported_extension(extension(&path)) {
                paths.push(path.to_string_lossy().into_owned());
            }
        }
        // read_dir order is platform-dependent
        paths.sort();
        Ok(paths)
    }

    async fn exists(&self, path: &str) -> Result<bool, BoxError> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn update_time(&self, path: &str) -> Result<SystemTime, BoxError> {
        Ok(tokio::fs::metadata(path).await?.modified()?)
    }

    async fn load(&self, path: &str) -> Result<ConfigTree, BoxError> {
        let content = self.read_content(Path::new(path)).await?;
        Ok(parse_config_str(extension(Path::new(path)), &content, path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_parses_to_tree() {
        let tree = parse_config_str("json", r#"{"object_a": {"name": "a"}}"#, "a.json").unwrap();
        assert_eq!(tree["object_a"]["name"], "a");
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_parses_to_tree() {
        let tree = parse_config_str("yaml", "object_a:\n  name: a\n", "a.yaml").unwrap();
        assert_eq!(tree["object_a"]["name"], "a");
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_parses_to_tree() {
        let tree = parse_config_str("toml", "[object_a]\nname = \"a\"\n", "a.toml").unwrap();
        assert_eq!(tree["object_a"]["name"], "a");
    }

    #[test]
    fn unsupported_format_is_rejected() {
        assert!(parse_config_str("xml", "<a/>", "a.xml").is_err());
    }
}
