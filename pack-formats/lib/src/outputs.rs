//! GitHub Actions step outputs.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::error::OutputError;

/// Writer for `name=value` step outputs.
///
/// Outputs are appended to the file named by `GITHUB_OUTPUT`. Outside of
/// Actions there is no such file and outputs are only logged.
#[derive(Debug, Clone, Default)]
pub struct ActionOutputs {
    file: Option<PathBuf>,
}

impl ActionOutputs {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file }
    }

    /// Reads the output file location from `GITHUB_OUTPUT`.
    pub fn from_env() -> Self {
        let file = std::env::var_os("GITHUB_OUTPUT")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::new(file)
    }

    /// Records one output.
    ///
    /// ## Errors
    ///
    /// Returns [`OutputError`] if the output file cannot be appended to.
    pub fn set(&self, name: &str, value: impl AsRef<str>) -> Result<(), OutputError> {
        let value = value.as_ref();
        info!("output {name}={value}");

        let Some(path) = &self.file else {
            return Ok(());
        };

        let record = if value.contains('\n') {
            let mut delimiter = format!("ghadelimiter_{}", std::process::id());
            while value.contains(&delimiter) {
                delimiter.push('_');
            }
            format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
        } else {
            format!("{name}={value}\n")
        };

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(record.as_bytes()))
            .map_err(|source| OutputError {
                path: path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn appends_simple_outputs() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("output");
        std::fs::write(&file, "earlier=1\n").unwrap();

        let outputs = ActionOutputs::new(Some(file.clone()));
        outputs.set("path", "formats.json").unwrap();
        outputs.set("did_update", true.to_string()).unwrap();

        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content, "earlier=1\npath=formats.json\ndid_update=true\n");
    }

    #[test]
    fn multiline_values_use_a_delimiter() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("output");

        let outputs = ActionOutputs::new(Some(file.clone()));
        outputs.set("notes", "a\nb").unwrap();

        let content = std::fs::read_to_string(&file).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("notes<<ghadelimiter_"));
        assert_eq!(&lines[1..3], ["a", "b"]);
        assert_eq!(lines[3], &lines[0]["notes<<".len()..]);
    }

    #[test]
    fn without_output_file_is_a_noop() {
        ActionOutputs::new(None).set("path", "x").unwrap();
    }
}
