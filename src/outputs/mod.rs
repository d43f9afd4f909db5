//! CI step outputs
//!
//! Outputs are appended to the file named by `GITHUB_OUTPUT` as
//! `key=value` lines.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// Appends `key=value` lines to the CI output file
#[derive(Debug, Clone)]
pub struct OutputWriter {
    path: PathBuf,
}

impl OutputWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Writer for the file named by `GITHUB_OUTPUT`
    pub fn from_env() -> Result<Self, OutputError> {
        match std::env::var(OUTPUT_ENV) {
            Ok(path) if !path.is_empty() => Ok(Self::new(path)),
            _ => Err(OutputError::NotConfigured),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a single output. The file is created with mode 0644 if needed.
    pub fn set(&self, key: &str, value: &str) -> Result<(), OutputError> {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }

        let mut file = options
            .open(&self.path)
            .map_err(|e| OutputError::Open(e.to_string()))?;
        writeln!(file, "{}={}", key, value).map_err(|e| OutputError::Write(e.to_string()))?;

        tracing::debug!(output = %key, "Set step output");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("No output file configured: set {OUTPUT_ENV} to a writable path")]
    NotConfigured,

    #[error("Unable to open output file: {0}")]
    Open(String),

    #[error("Unable to write to output file: {0}")]
    Write(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_appends_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("github-output");
        std::fs::write(&path, "existing=1\n").unwrap();

        let writer = OutputWriter::new(&path);
        writer.set("alerts_created", "abc def").unwrap();
        writer.set("alerts_deleted", "").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "existing=1\nalerts_created=abc def\nalerts_deleted=\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out");
        OutputWriter::new(&path).set("rules_integrated", "a.json").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        // umask can only clear bits
        assert_eq!(mode & 0o133, 0);
    }
}
