//! `garnet.toml` settings and where to find them.
//!
//! ```toml
//! [infer]
//! max_fixpoint_passes = 16
//! max_program_passes = 8
//! max_specialization_depth = 64
//!
//! [format]
//! indent_size = 2
//! max_width = 100
//! ```

use std::path::{Path, PathBuf};

use garnet_fmt::FormatConfig;
use garnet_typeck::InferConfig;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "garnet.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub infer: InferConfig,
    pub format: FormatConfig,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Settings, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_str(&content)
            .map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn from_str(content: &str) -> Result<Settings, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    /// Settings from `explicit`, else a `garnet.toml` beside `input`, else
    /// the defaults.
    pub fn load(explicit: Option<&Path>, input: &Path) -> Result<Settings, String> {
        match explicit.map(Path::to_path_buf).or_else(|| discover(input)) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading settings");
                Self::from_file(&path)
            }
            None => Ok(Settings::default()),
        }
    }
}

/// `garnet.toml` in the directory holding `input`, if there is one.
fn discover(input: &Path) -> Option<PathBuf> {
    let dir = match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let candidate = dir.join(SETTINGS_FILE);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_settings() {
        let settings = Settings::from_str(
            r#"
[infer]
max_fixpoint_passes = 4
max_program_passes = 2

[format]
indent_size = 4
"#,
        )
        .unwrap();
        assert_eq!(settings.infer.max_fixpoint_passes, 4);
        assert_eq!(settings.infer.max_program_passes, 2);
        assert_eq!(settings.format.indent_size, 4);
        assert_eq!(settings.format.max_width, 100);
    }

    #[test]
    fn missing_tables_use_defaults() {
        let settings = Settings::from_str("").unwrap();
        assert_eq!(settings.infer, InferConfig::default());
        assert_eq!(settings.format.indent_size, 2);
    }

    #[test]
    fn unknown_value_types_are_rejected() {
        let err = Settings::from_str("[infer]\nmax_fixpoint_passes = \"many\"\n").unwrap_err();
        assert!(err.starts_with("Failed to parse settings"), "{err}");
    }

    #[test]
    fn discovers_settings_beside_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tree.json");
        assert_eq!(discover(&input), None);
        std::fs::write(dir.path().join(SETTINGS_FILE), "[infer]\n").unwrap();
        assert_eq!(discover(&input), Some(dir.path().join(SETTINGS_FILE)));
    }
}
