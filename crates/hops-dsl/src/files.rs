//! Reading the automations directory
//!
//! Only two levels are read: the root and each immediate subdirectory. Files
//! directly under the root are ignored, as is anything whose name starts with
//! `..` (the layout orchestrators use for mounted config maps).

use std::fs;
use std::path::Path;
use tracing::{debug, trace};

use crate::error::{DslError, DslResult};

/// Kind of an automation file, decided by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Hops,
    Manifest,
    Other,
}

/// One file of an automation with its slash-separated relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl AutomationFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn file_type(&self) -> FileType {
        file_type(&self.path)
    }

    /// Automation directory, the first path component
    pub fn dir(&self) -> &str {
        automation_dir(&self.path)
    }
}

/// Classify a path as hops config, manifest or opaque asset
pub fn file_type(path: &str) -> FileType {
    let base = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    if base.ends_with(".hops") {
        FileType::Hops
    } else if base == "manifest.yaml" || base == "manifest.yml" {
        FileType::Manifest
    } else {
        FileType::Other
    }
}

/// First component of a relative path
pub fn automation_dir(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

/// Everything up to the last `/`, or empty for a bare file name
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn is_hidden_mount(name: &str) -> bool {
    name.starts_with("..")
}

/// Read every automation file under `root`, sorted by path
pub fn read_automation_dir(root: &Path) -> DslResult<Vec<AutomationFile>> {
    let read_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DslError::Read { path, source }
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(root).map_err(read_err(root))? {
        let entry = entry.map_err(read_err(root))?;
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden_mount(&dir_name) {
            trace!("Skipping {}", dir_name);
            continue;
        }

        // Follows symlinks so mounted directories count as directories
        let dir_path = entry.path();
        let Ok(meta) = fs::metadata(&dir_path) else {
            continue;
        };
        if !meta.is_dir() {
            continue;
        }

        for file in fs::read_dir(&dir_path).map_err(read_err(&dir_path))? {
            let file = file.map_err(read_err(&dir_path))?;
            let file_name = file.file_name().to_string_lossy().into_owned();
            if is_hidden_mount(&file_name) {
                continue;
            }
            let file_path = file.path();
            match fs::metadata(&file_path) {
                Ok(meta) if meta.is_file() => {}
                _ => continue,
            }

            let content = fs::read(&file_path).map_err(read_err(&file_path))?;
            files.push(AutomationFile::new(format!("{}/{}", dir_name, file_name), content));
        }
    }

    if files.is_empty() {
        return Err(DslError::NoAutomations {
            path: root.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), count = files.len(), "Read automation files");
    Ok(files)
}
