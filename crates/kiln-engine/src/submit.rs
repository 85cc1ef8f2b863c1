//! Job submission.
//!
//! A submission is staged under `input/writing/<id>/` and published with a
//! single rename into `input/ready/<id>/`. The rename is the publication
//! point: the scanner can never observe a partially written job. Validation
//! happens before any directory is created; any staging failure rolls the
//! whole directory back.

use std::fs;
use std::path::{Path, PathBuf};

use kiln_core::config::LimitsConfig;
use kiln_core::layout::{IMAGES_DIR, PROMPT_FILE, TYPE_FILE};
use kiln_core::{JobId, JobKind, SubmitError, WorkspaceLayout};

/// Image extensions the vision path accepts, lowercase.
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

pub struct Submitter {
    layout: WorkspaceLayout,
    limits: LimitsConfig,
}

impl Submitter {
    /// Open a workspace for submission, materializing the skeleton if
    /// missing.
    pub fn new(layout: WorkspaceLayout, limits: LimitsConfig) -> Result<Self, SubmitError> {
        layout.ensure()?;
        Ok(Self { layout, limits })
    }

    /// Validate, stage, and publish one job. Returns the new id.
    pub fn submit(
        &self,
        prompt: &str,
        kind: JobKind,
        attachments: &[PathBuf],
    ) -> Result<JobId, SubmitError> {
        self.validate_prompt(prompt)?;
        if !attachments.is_empty() && kind != JobKind::Vision {
            return Err(SubmitError::InvalidContent(format!(
                "attachments are only valid for vision jobs (got {kind})"
            )));
        }
        for path in attachments {
            self.validate_image(path)?;
        }

        let id = JobId::generate();
        let staging = self.layout.writing_job(&id);
        fs::create_dir_all(&staging)
            .map_err(|e| SubmitError::io("failed to create job directory", e))?;

        let staged = self.stage(&staging, prompt, kind, attachments);
        if let Err(e) = staged {
            // Roll back: nothing under writing/ survives a failed submit.
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        // Publication point.
        if let Err(e) = fs::rename(&staging, self.layout.ready_job(&id)) {
            let _ = fs::remove_dir_all(&staging);
            return Err(SubmitError::io("failed to publish job", e));
        }

        tracing::info!(job = %id, %kind, "job submitted");
        Ok(id)
    }

    fn stage(
        &self,
        staging: &Path,
        prompt: &str,
        kind: JobKind,
        attachments: &[PathBuf],
    ) -> Result<(), SubmitError> {
        fs::write(staging.join(PROMPT_FILE), prompt.as_bytes())
            .map_err(|e| SubmitError::io("failed to write prompt file", e))?;

        if kind != JobKind::Text {
            fs::write(staging.join(TYPE_FILE), kind.as_str())
                .map_err(|e| SubmitError::io("failed to write type file", e))?;
        }

        if !attachments.is_empty() {
            self.stage_images(staging, attachments)?;
        }
        Ok(())
    }

    fn stage_images(&self, staging: &Path, attachments: &[PathBuf]) -> Result<(), SubmitError> {
        let images_dir = staging.join(IMAGES_DIR);
        fs::create_dir_all(&images_dir)
            .map_err(|e| SubmitError::io("failed to create images directory", e))?;

        for (idx, src) in attachments.iter().enumerate() {
            let ext = src
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let dest = images_dir.join(format!("image_{idx}.{ext}"));
            place_image(src, &images_dir, &dest)
                .map_err(|e| SubmitError::io(format!("failed to stage {}", src.display()), e))?;
        }
        Ok(())
    }

    fn validate_prompt(&self, prompt: &str) -> Result<(), SubmitError> {
        if prompt.is_empty() {
            return Err(SubmitError::InvalidContent("prompt is empty".to_string()));
        }
        let max = self.limits.max_prompt_bytes;
        if prompt.len() as u64 > max {
            return Err(SubmitError::InvalidSize(format!(
                "prompt exceeds maximum size limit ({max} bytes)"
            )));
        }
        Ok(())
    }

    fn validate_image(&self, path: &Path) -> Result<(), SubmitError> {
        let meta = fs::metadata(path).map_err(|_| {
            SubmitError::InvalidContent(format!("image file not found: {}", path.display()))
        })?;
        if !meta.is_file() {
            return Err(SubmitError::InvalidContent(format!(
                "image path is not a file: {}",
                path.display()
            )));
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(SubmitError::InvalidContent(format!(
                "unsupported image extension: {}",
                path.display()
            )));
        }
        let max = self.limits.max_image_bytes;
        if meta.len() > max {
            return Err(SubmitError::InvalidSize(format!(
                "image exceeds size limit ({max} bytes): {}",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Place one attachment into the staging images directory.
///
/// Same filesystem: symlink to the absolute source path, so the reference
/// survives the directory renames a job goes through. Different filesystem
/// or symlink failure: copy the bytes.
fn place_image(src: &Path, images_dir: &Path, dest: &Path) -> std::io::Result<()> {
    if same_device(src, images_dir) {
        let absolute = src.canonicalize()?;
        #[cfg(unix)]
        {
            if std::os::unix::fs::symlink(&absolute, dest).is_ok() {
                return Ok(());
            }
        }
        let _ = absolute;
    }
    fs::copy(src, dest).map(|_| ())
}

#[cfg(unix)]
fn same_device(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_device(_a: &Path, _b: &Path) -> bool {
    false
}
