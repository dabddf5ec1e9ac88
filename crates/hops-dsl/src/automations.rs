//! The immutable, decoded automations set

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hops_core::EventName;
use hops_expression::Files;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ast::{HopsAst, OnAst, ScheduleAst, TaskAst};
use crate::decode::Decoder;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{DslError, DslResult};
use crate::files::{read_automation_dir, AutomationFile, FileType};
use crate::manifest::Manifest;

/// Hash of the placeholder automations used when nothing valid is loaded
pub const EMPTY_HASH: &str = "empty";

/// Every file, manifest and block of an automations directory
#[derive(Debug, Clone)]
pub struct Automations {
    pub files: Arc<Files>,
    /// Manifests keyed by automation directory
    pub manifests: BTreeMap<String, Manifest>,
    pub hops: HopsAst,
    /// Hex SHA-256 over the file contents in path order
    pub hash: String,
}

impl Automations {
    /// Decode a file set, returning the result together with its diagnostics
    pub fn from_files(mut files: Vec<AutomationFile>) -> (Self, Diagnostics) {
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut hasher = Sha256::new();
        let mut decoder = Decoder::new();
        let mut manifests = BTreeMap::new();
        let mut manifest_diags = Diagnostics::new();
        let mut file_map = Files::new();

        for file in files {
            hasher.update(&file.content);
            match file.file_type() {
                FileType::Hops => decoder.decode_file(&file.path, &file.content),
                FileType::Manifest => match Manifest::from_yaml(&file.content) {
                    Ok(manifest) => {
                        manifests.insert(file.dir().to_string(), manifest);
                    }
                    Err(e) => manifest_diags.push(
                        Diagnostic::error("Invalid automation manifest", e).in_file(&file.path),
                    ),
                },
                FileType::Other => {}
            }
            file_map.insert(file.path, file.content);
        }

        let (hops, mut diagnostics) = decoder.finish();
        diagnostics.extend(manifest_diags);

        let automations = Self {
            files: Arc::new(file_map),
            manifests,
            hops,
            hash: format!("{:x}", hasher.finalize()),
        };
        (automations, diagnostics)
    }

    /// Read and decode `root`, failing on any error diagnostic
    pub fn from_dir(root: &Path) -> DslResult<Self> {
        let files = read_automation_dir(root)?;
        Self::checked(files)
    }

    /// Decode files previously serialized with [`Automations::encode_files`]
    pub fn from_stored(bytes: &[u8]) -> DslResult<Self> {
        Self::checked(decode_files(bytes)?)
    }

    fn checked(files: Vec<AutomationFile>) -> DslResult<Self> {
        let (automations, diagnostics) = Self::from_files(files);
        if diagnostics.has_errors() {
            return Err(DslError::Invalid(diagnostics));
        }
        for diag in &diagnostics {
            warn!("{}", diag);
        }
        debug!(
            hash = %automations.hash,
            ons = automations.hops.ons.len(),
            schedules = automations.hops.schedules.len(),
            tasks = automations.hops.tasks.len(),
            "Decoded automations"
        );
        Ok(automations)
    }

    /// Placeholder that matches nothing, used when a load fails but the
    /// runner must keep going
    pub fn empty() -> Self {
        Self {
            files: Arc::new(Files::new()),
            manifests: BTreeMap::new(),
            hops: HopsAst::default(),
            hash: EMPTY_HASH.to_string(),
        }
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.hash == EMPTY_HASH
    }

    /// `on` blocks for an event: `event_action` ones first, then `event` ones
    pub fn event_ons(&self, name: &EventName) -> Vec<&OnAst> {
        let mut ons = Vec::new();
        if let Some(key) = name.event_action_key() {
            ons.extend(self.hops.ons_for(&key));
        }
        ons.extend(self.hops.ons_for(&name.event));
        ons
    }

    pub fn schedules(&self) -> &[ScheduleAst] {
        &self.hops.schedules
    }

    pub fn tasks(&self) -> &[TaskAst] {
        &self.hops.tasks
    }

    /// Task with exactly this name
    pub fn task(&self, name: &str) -> DslResult<&TaskAst> {
        self.hops
            .tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DslError::TaskNotFound {
                name: name.to_string(),
            })
    }

    /// Tasks declared in files under automation directory `dir`
    pub fn tasks_in_path(&self, dir: &str) -> Vec<&TaskAst> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.hops
            .tasks
            .iter()
            .filter(|t| t.filepath.starts_with(&prefix))
            .collect()
    }

    /// Manifest of the automation that declared `file_path`
    pub fn manifest_for(&self, file_path: &str) -> Option<&Manifest> {
        self.manifests
            .get(crate::files::automation_dir(file_path))
    }

    /// Serialize the file set as JSON with base64 contents
    pub fn encode_files(&self) -> DslResult<Vec<u8>> {
        let encoded: BTreeMap<&str, String> = self
            .files
            .iter()
            .map(|(path, content)| (path.as_str(), STANDARD.encode(content)))
            .collect();
        Ok(serde_json::to_vec(&encoded)?)
    }
}

/// Inverse of [`Automations::encode_files`]
pub fn decode_files(bytes: &[u8]) -> DslResult<Vec<AutomationFile>> {
    let encoded: BTreeMap<String, String> =
        serde_json::from_slice(bytes).map_err(|e| DslError::InvalidStoredFiles {
            reason: e.to_string(),
        })?;

    encoded
        .into_iter()
        .map(|(path, content)| {
            let content = STANDARD
                .decode(content)
                .map_err(|e| DslError::InvalidStoredFiles {
                    reason: format!("{}: {}", path, e),
                })?;
            Ok(AutomationFile::new(path, content))
        })
        .collect()
}
