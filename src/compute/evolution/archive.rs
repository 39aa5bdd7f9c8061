//! Population persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::schema::PopulationDto;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No saved population named '{0}'")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed population document: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Loads and saves populations by species name.
pub trait PopulationStore: Send + Sync {
    fn load(&self, name: &str) -> Result<PopulationDto, StoreError>;
    fn save(&self, name: &str, population: &PopulationDto) -> Result<(), StoreError>;
}

/// One pretty-printed JSON file per species in a directory.
#[derive(Debug, Clone)]
pub struct JsonArchive {
    dir: PathBuf,
}

impl JsonArchive {
    /// Use `dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `name`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl PopulationStore for JsonArchive {
    fn load(&self, name: &str) -> Result<PopulationDto, StoreError> {
        let path = self.path_for(name);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, name: &str, population: &PopulationDto) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(population)?;
        fs::write(self.path_for(name), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CandidateDto;
    use tempfile::tempdir;

    fn population() -> PopulationDto {
        PopulationDto {
            generation: 41,
            candidates: vec![
                CandidateDto {
                    genes: vec![0.125, -3.5, 9.0],
                    score: 0.75,
                },
                CandidateDto {
                    genes: vec![1.0 / 3.0, 0.0, 2.5e-7],
                    score: -1.25,
                },
            ],
        }
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempdir().unwrap();
        let archive = JsonArchive::new(dir.path()).unwrap();

        let saved = population();
        archive.save("walker", &saved).unwrap();
        let loaded = archive.load("walker").unwrap();

        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_missing_population() {
        let dir = tempdir().unwrap();
        let archive = JsonArchive::new(dir.path()).unwrap();
        assert!(matches!(
            archive.load("nobody"),
            Err(StoreError::NotFound(name)) if name == "nobody"
        ));
    }

    #[test]
    fn test_malformed_document() {
        let dir = tempdir().unwrap();
        let archive = JsonArchive::new(dir.path()).unwrap();
        fs::write(archive.path_for("broken"), "{ not json").unwrap();
        assert!(matches!(archive.load("broken"), Err(StoreError::Serde(_))));
    }

    #[test]
    fn test_path_sanitizing() {
        let dir = tempdir().unwrap();
        let archive = JsonArchive::new(dir.path().join("nested")).unwrap();
        assert!(archive.dir().exists());
        assert_eq!(
            archive.path_for("big cat/v2"),
            archive.dir().join("big_cat_v2.json")
        );
    }
}
