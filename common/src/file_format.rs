use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|os_str| os_str.to_str())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerdeFormat {
    Yaml,
    Json,
}

impl SerdeFormat {
    pub fn from_path(path: &Path) -> FileFormatResult<Self> {
        let ext = get_file_extension(path).ok_or(FileExtensionError::MissingFileExtension)?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FileExtensionError::UnsupportedFileExtension(
                path.display().to_string(),
            ))
        }
    }
}

pub fn serialize<T: Serialize>(value: &T, format: SerdeFormat) -> SerdeFormatResult<String> {
    Ok(match format {
        SerdeFormat::Yaml => serde_yml::to_string(value)?,
        SerdeFormat::Json => serde_json::to_string_pretty(value)?,
    })
}

pub fn deserialize<T: DeserializeOwned>(
    serialized: &str,
    format: SerdeFormat,
) -> SerdeFormatResult<T> {
    match format {
        SerdeFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        SerdeFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

/// Reads a YAML or JSON file, picking the format from the extension.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let format = SerdeFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    deserialize(&text, format).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: f64,
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            SerdeFormat::from_path(Path::new("a.YAML")).unwrap(),
            SerdeFormat::Yaml
        );
        assert_eq!(
            SerdeFormat::from_path(Path::new("dir/a.yml")).unwrap(),
            SerdeFormat::Yaml
        );
        assert_eq!(
            SerdeFormat::from_path(Path::new("a.json")).unwrap(),
            SerdeFormat::Json
        );
        assert!(matches!(
            SerdeFormat::from_path(Path::new("a")),
            Err(FileExtensionError::MissingFileExtension)
        ));
        assert!(matches!(
            SerdeFormat::from_path(Path::new("a.toml")),
            Err(FileExtensionError::UnsupportedFileExtension(_))
        ));
    }

    #[test]
    fn yaml_and_json_agree() {
        let sample = Sample {
            name: "vega".to_string(),
            value: 0.03,
        };
        for format in [SerdeFormat::Yaml, SerdeFormat::Json] {
            let text = serialize(&sample, format).unwrap();
            let back: Sample = deserialize(&text, format).unwrap();
            assert_eq!(back, sample);
        }
    }

    #[test]
    fn load_file_reports_path() {
        let err = load_file::<Sample>(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(err.to_string().contains("catalog.json"));
    }
}
