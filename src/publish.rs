//! Filing finished PDFs into the locally-mounted cloud folder tree.
//!
//! The tree under `sync_root` is mirrored to the cloud by an external agent.
//! The agent is lazy in both directions: directories created locally are not
//! registered until told to reconcile, and remote files appear locally as
//! zero-length placeholders until pulled. Both quirks are handled here so
//! callers see ordinary files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

const ARCHIVE_EXTENSIONS: [&str; 3] = ["zip", "rar", "7z"];

/// How long to wait for a placeholder to fill in: 50 polls, 200ms apart.
const MATERIALIZE_POLLS: u32 = 50;
const MATERIALIZE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("sync agent failed: {0}")]
    Agent(String),
    #[error("placeholder never materialized: {0}")]
    NeverMaterialized(PathBuf),
    #[error("publish I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The external synchronization agent, reduced to the two verbs this
/// service needs.
pub trait SyncAgent: Send + Sync {
    /// Reconcile a path with its cloud copy.
    fn refresh(&self, path: &Path) -> Result<(), PublishError>;
    /// Block until a placeholder file has real content on disk.
    fn materialize(&self, path: &Path) -> Result<(), PublishError>;
}

/// Drives the agent's command-line interface.
pub struct CliSyncAgent {
    command: String,
}

impl CliSyncAgent {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl SyncAgent for CliSyncAgent {
    fn refresh(&self, path: &Path) -> Result<(), PublishError> {
        let status = Command::new(&self.command)
            .arg("refresh")
            .arg(path)
            .status()
            .map_err(|e| PublishError::Agent(format!("{}: {e}", self.command)))?;
        if !status.success() {
            return Err(PublishError::Agent(format!(
                "refresh {} exited with {status}",
                path.display()
            )));
        }
        Ok(())
    }

    fn materialize(&self, path: &Path) -> Result<(), PublishError> {
        self.refresh(path)?;
        for _ in 0..MATERIALIZE_POLLS {
            let populated = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
            if populated {
                return Ok(());
            }
            std::thread::sleep(MATERIALIZE_INTERVAL);
        }
        Err(PublishError::NeverMaterialized(path.to_path_buf()))
    }
}

pub struct ArtifactPublisher {
    root: PathBuf,
    agent: Box<dyn SyncAgent>,
}

impl ArtifactPublisher {
    pub fn new(root: &Path, agent: Box<dyn SyncAgent>) -> Self {
        Self {
            root: root.to_path_buf(),
            agent,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy a PDF to `<root>/<project>/<category>/<filename>` and push it to
    /// the cloud. Freshly created directories are reconciled immediately, or
    /// the agent would never pick up files placed inside them.
    pub fn publish(
        &self,
        pdf: &Path,
        project: &str,
        category: &str,
        filename: &str,
    ) -> Result<PathBuf, PublishError> {
        let project_dir = self.root.join(sanitize_filename::sanitize(project));
        let category_dir = project_dir.join(sanitize_filename::sanitize(category));

        let mut created = Vec::new();
        for dir in [self.root.clone(), project_dir, category_dir.clone()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                created.push(dir);
            }
        }
        for dir in &created {
            self.agent.refresh(dir)?;
        }

        let destination = category_dir.join(filename);
        // A stale copy (or an unmaterialized placeholder) blocks the write.
        if destination.exists() {
            fs::remove_file(&destination)?;
        }
        fs::copy(pdf, &destination)?;
        // The agent watches directories, not files: reconcile the parent so
        // the mirror picks up the new copy.
        self.agent.refresh(&category_dir)?;

        log::info!("published {}", destination.display());
        Ok(destination)
    }

    /// Every archive under the synced tree (or one project's subtree),
    /// materialized and ready to read.
    pub fn discover_archives(&self, project: Option<&str>) -> Result<Vec<PathBuf>, PublishError> {
        let root = match project {
            Some(p) => self.root.join(sanitize_filename::sanitize(p)),
            None => self.root.clone(),
        };
        let mut found = Vec::new();
        if root.exists() {
            collect_archives(&root, &mut found)?;
        }
        found.sort();
        for path in &found {
            self.agent.materialize(path)?;
        }
        Ok(found)
    }
}

fn collect_archives(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PublishError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_archives(&path, out)?;
        } else if is_archive(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            ARCHIVE_EXTENSIONS.iter().any(|known| *known == e)
        })
        .unwrap_or(false)
}
