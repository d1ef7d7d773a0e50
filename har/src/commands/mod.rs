//! CLI subcommand implementations and shared plumbing.

pub mod convert;
pub mod parse;
pub mod route;
pub mod transform;

use std::fmt;
use std::path::{Path, PathBuf};

/// A fatal CLI error, printed as `<stage> error: <message>` on stderr.
#[derive(Debug)]
pub struct StageError {
    stage: &'static str,
    message: String,
}

impl StageError {
    pub fn new(stage: &'static str, message: impl fmt::Display) -> Self {
        Self {
            stage,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.stage, self.message)
    }
}

impl std::error::Error for StageError {}

pub fn read_file(path: &Path) -> Result<String, StageError> {
    std::fs::read_to_string(path)
        .map_err(|err| StageError::new("io", format!("{}: {err}", path.display())))
}

/// Write to `--output` or stdout.
pub fn write_output(output: Option<&PathBuf>, text: &str) -> Result<(), StageError> {
    match output {
        Some(path) => std::fs::write(path, text)
            .map_err(|err| StageError::new("io", format!("{}: {err}", path.display()))),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_format() {
        let err = StageError::new("parse", "bad yaml");
        assert_eq!(err.to_string(), "parse error: bad yaml");
    }

    #[test]
    fn test_read_file_missing() {
        let err = read_file(Path::new("/nonexistent/input.yml")).unwrap_err();
        assert!(err.to_string().starts_with("io error:"));
    }
}
