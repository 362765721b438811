use crate::errors::HarnessError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, HarnessError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), HarnessError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), HarnessError>;
    fn exists(&self, path: &Path) -> bool;
    /// True when `path` is a regular file that can be opened for reading.
    fn is_readable_file(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), HarnessError>;
    fn write_error_line(&self, line: &str) -> Result<(), HarnessError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, HarnessError> {
        std::fs::read_to_string(path).map_err(|e| HarnessError::Io(e.to_string()))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), HarnessError> {
        std::fs::write(path, contents).map_err(|e| HarnessError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), HarnessError> {
        std::fs::create_dir_all(path).map_err(|e| HarnessError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_readable_file(&self, path: &Path) -> bool {
        path.is_file() && std::fs::File::open(path).is_ok()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), HarnessError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| HarnessError::Io(e.to_string()))
    }

    fn write_error_line(&self, line: &str) -> Result<(), HarnessError> {
        use std::io::Write;
        let mut err = std::io::stderr();
        writeln!(err, "{line}").map_err(|e| HarnessError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    read_only: Arc<Mutex<HashSet<PathBuf>>>,
    fail_next: Arc<Mutex<Option<HarnessError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: HarnessError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    /// Reject every later write to `path`.
    pub fn deny_writes(&self, path: impl Into<PathBuf>) {
        self.read_only
            .lock()
            .expect("read-only lock")
            .insert(path.into());
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().expect("dirs lock").clone()
    }

    fn maybe_fail(&self) -> Result<(), HarnessError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, HarnessError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| HarnessError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), HarnessError> {
        self.maybe_fail()?;
        if self.read_only.lock().expect("read-only lock").contains(path) {
            return Err(HarnessError::Io(format!(
                "permission denied: {}",
                path.display()
            )));
        }
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), HarnessError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().expect("files lock");
        files.contains_key(path) || files.keys().any(|file| file.starts_with(path))
    }

    fn is_readable_file(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), HarnessError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn write_error_line(&self, line: &str) -> Result<(), HarnessError> {
        self.errors
            .lock()
            .expect("errors lock")
            .push(line.to_string());
        Ok(())
    }
}
