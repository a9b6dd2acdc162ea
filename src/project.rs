//! Where guest programs come from.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project file `{0}` not found")]
    NotFound(String),

    #[error("Invalid project file name `{0}`")]
    InvalidName(String),

    #[error("Failed to read `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Supplies the current source text of a named guest file.
pub trait ProjectStore {
    fn source(&self, name: &str) -> Result<String, StoreError>;
}

/// Appends the `.py` extension when the name has none.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim();
    if name.ends_with(".py") {
        name.to_string()
    } else {
        format!("{name}.py")
    }
}

/// Files under a project directory, `project/` by default.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let file = normalize_name(name);
        let relative = Path::new(&file);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoreError::InvalidName(file));
        }
        Ok(self.root.join(relative))
    }
}

impl Default for DirectoryStore {
    fn default() -> Self {
        Self::new("project")
    }
}

impl ProjectStore for DirectoryStore {
    fn source(&self, name: &str) -> Result<String, StoreError> {
        let path = self.resolve(name)?;
        std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(normalize_name(name))
            } else {
                StoreError::Io {
                    name: normalize_name(name),
                    source,
                }
            }
        })
    }
}

/// In-memory project, as an editor keeps it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, source: impl Into<String>) {
        self.files.insert(normalize_name(name), source.into());
    }
}

impl ProjectStore for MemoryStore {
    fn source(&self, name: &str) -> Result<String, StoreError> {
        let name = normalize_name(name);
        self.files
            .get(&name)
            .cloned()
            .ok_or(StoreError::NotFound(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_optional() {
        assert_eq!(normalize_name("snake"), "snake.py");
        assert_eq!(normalize_name("snake.py"), "snake.py");
    }

    #[test]
    fn directory_store_reads_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.py"), "print(1)\n").expect("write");
        let store = DirectoryStore::new(dir.path());
        assert_eq!(store.source("main").expect("source"), "print(1)\n");
        assert!(matches!(store.source("other"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn parent_directories_are_rejected() {
        let store = DirectoryStore::default();
        assert!(matches!(
            store.source("../secrets"),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn memory_store_round_trips_names() {
        let mut store = MemoryStore::new();
        store.insert("main.py", "x = 1");
        assert_eq!(store.source("main").expect("source"), "x = 1");
    }
}
