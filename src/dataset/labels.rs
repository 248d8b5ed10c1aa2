//! Label codec: the persisted index <-> class-name table.
//!
//! Class indices are assigned once when the training labels are fitted
//! (sorted unique names, the same order a label encoder produces) and stored
//! as JSON next to the weights. At inference time only the index -> name
//! direction is used.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{DermaCareError, Result};

/// On-disk layouts accepted for the codec artifact
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodecFile {
    Table { classes: Vec<String> },
    List(Vec<String>),
}

#[derive(Debug, Serialize)]
struct CodecFileOut<'a> {
    classes: &'a [String],
}

/// Bidirectional mapping between class indices and class names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCodec {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelCodec {
    /// Build a codec from an ordered list of names
    ///
    /// Fails on an empty list or duplicate names.
    pub fn new(classes: Vec<String>) -> std::result::Result<Self, String> {
        if classes.is_empty() {
            return Err("codec has no classes".to_string());
        }

        let mut index = HashMap::with_capacity(classes.len());
        for (i, name) in classes.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(format!("class {} has an empty name", i));
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(format!("duplicate class name '{}'", name));
            }
        }

        Ok(Self { classes, index })
    }

    /// Fit a codec from raw training labels: unique names in sorted order
    pub fn fit<I, S>(labels: I) -> std::result::Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        Self::new(unique.into_iter().collect())
    }

    /// Load the codec artifact from disk
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading label codec from {:?}", path);

        let json = std::fs::read_to_string(path)
            .map_err(|e| DermaCareError::CodecLoad(path.to_path_buf(), e.to_string()))?;
        let file: CodecFile = serde_json::from_str(&json)
            .map_err(|e| DermaCareError::CodecLoad(path.to_path_buf(), e.to_string()))?;
        let classes = match file {
            CodecFile::Table { classes } => classes,
            CodecFile::List(classes) => classes,
        };

        let codec = Self::new(classes)
            .map_err(|reason| DermaCareError::CodecLoad(path.to_path_buf(), reason))?;
        info!(
            "Label codec loaded: {} classes {:?}",
            codec.class_count(),
            codec.classes
        );
        Ok(codec)
    }

    /// Persist the codec as `{"classes": [...]}`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&CodecFileOut {
            classes: &self.classes,
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Name of the class at `index`
    pub fn name_for(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(DermaCareError::UnknownIndex {
                index,
                class_count: self.classes.len(),
            })
    }

    /// Index of the class called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn skin_codec() -> LabelCodec {
        LabelCodec::new(vec![
            "acne".to_string(),
            "healthy".to_string(),
            "sun_damage".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_name_for_and_index_of() {
        let codec = skin_codec();
        assert_eq!(codec.class_count(), 3);
        assert_eq!(codec.name_for(1).unwrap(), "healthy");
        assert_eq!(codec.index_of("sun_damage"), Some(2));
        assert_eq!(codec.index_of("eczema"), None);
    }

    #[test]
    fn test_out_of_range_index() {
        let err = skin_codec().name_for(3).unwrap_err();
        assert!(matches!(
            err,
            DermaCareError::UnknownIndex {
                index: 3,
                class_count: 3
            }
        ));
    }

    #[test]
    fn test_fit_sorts_and_dedups() {
        let codec = LabelCodec::fit(["sun_damage", "acne", "healthy", "acne"]).unwrap();
        assert_eq!(codec.classes(), skin_codec().classes());
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(LabelCodec::new(vec![]).is_err());
        assert!(LabelCodec::new(vec!["a".into(), "a".into()]).is_err());
        assert!(LabelCodec::new(vec!["a".into(), " ".into()]).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        let codec = skin_codec();
        codec.save(&path).unwrap();

        let loaded = LabelCodec::load(&path).unwrap();
        assert_eq!(loaded, codec);
    }

    #[test]
    fn test_load_bare_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, r#"["acne", "healthy", "sun_damage"]"#).unwrap();
        assert_eq!(LabelCodec::load(&path).unwrap(), skin_codec());
    }

    #[test]
    fn test_missing_file_is_codec_load_error() {
        let err = LabelCodec::load(Path::new("/nope/labels.json")).unwrap_err();
        assert!(matches!(err, DermaCareError::CodecLoad(..)));
    }

    #[test]
    fn test_corrupt_file_is_codec_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            LabelCodec::load(&path).unwrap_err(),
            DermaCareError::CodecLoad(..)
        ));

        std::fs::write(&path, r#"{"classes": []}"#).unwrap();
        assert!(matches!(
            LabelCodec::load(&path).unwrap_err(),
            DermaCareError::CodecLoad(..)
        ));
    }
}
