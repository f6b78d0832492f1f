use super::{Backend, Document, LoadError};
use std::path::{Path, PathBuf};

/// Directory of `*.json` files. The document name is the file name without `.json`.
#[derive(Debug)]
pub struct LocalBackend {
    directory: PathBuf,
    location: String,
}

impl LocalBackend {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        let location = directory.display().to_string();
        Self {
            directory,
            location,
        }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        let path = self.directory.join(name);
        if path.extension().is_some_and(|ext| ext == "json") {
            return path;
        }

        tracing::trace!(document = name, "appended .json to document name");
        self.directory.join(format!("{name}.json"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.to_owned(),
        source,
    }
}

impl Backend for LocalBackend {
    fn location(&self) -> &str {
        &self.location
    }

    fn document_names(&self) -> Result<Vec<String>, LoadError> {
        let mut names = vec![];

        let read_dir = std::fs::read_dir(&self.directory).map_err(|e| io_error(&self.directory, e))?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| io_error(&self.directory, e))?;
            let path = dir_entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    fn fetch(&self, name: &str) -> Result<Document, LoadError> {
        let path = self.path_of(name);
        tracing::debug!(path=%path.display(), "loading file");

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound {
                    name: name.to_string(),
                    location: self.location.clone(),
                })
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        match serde_json::from_str(&contents) {
            Ok(serde_json::Value::Object(document)) => Ok(document),
            Ok(_) => Err(LoadError::NotAnObject(name.to_string())),
            Err(source) => {
                tracing::error!(path=%path.display(), "could not load json file, it probably contains invalid json");
                Err(LoadError::InvalidJson { path, source })
            }
        }
    }
}
