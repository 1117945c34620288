use std::path::{Path, PathBuf};

use vqa_model::{GpuSet, RunId};

use crate::{error::CoreError, layout::RunLayout};

pub const DEFAULT_SUFFIX: &str = "_scored";

/// Driver-side settings of one scoring run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    /// Passed through to every worker; never validated here.
    pub label_catalog: Option<PathBuf>,
    pub gpus: GpuSet,
    /// Directory for slice files, partial outputs and the manifest.
    pub workdir: PathBuf,
    /// Final output path. Derived from the input name when `None`.
    pub output: Option<PathBuf>,
    /// Appended to the input stem when deriving the output name.
    pub suffix: String,
    pub run_id: RunId,
    /// Keep slice files and partial outputs after a successful merge.
    pub keep_partials: bool,
}

impl RunConfig {
    /// Defaults: working directory next to the input, `_scored` suffix, fresh run id.
    pub fn new(input: impl Into<PathBuf>, gpus: GpuSet) -> Self {
        let input = input.into();
        let workdir = parent_or_cwd(&input);
        Self {
            input,
            label_catalog: None,
            gpus,
            workdir,
            output: None,
            suffix: DEFAULT_SUFFIX.to_string(),
            run_id: generate_run_id(),
            keep_partials: false,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.input.file_stem().is_none() {
            return Err(CoreError::Config(format!(
                "input path has no file name: {}",
                self.input.display()
            )));
        }
        if self.output.is_none() && self.suffix.is_empty() {
            return Err(CoreError::Config(
                "output suffix must not be empty (it would overwrite the input)".into(),
            ));
        }
        if self.output_path() == self.input {
            return Err(CoreError::Config("output path equals input path".into()));
        }
        if self.run_id.is_empty()
            || !self
                .run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::Config(format!(
                "run id '{}' must be non-empty and use only [A-Za-z0-9_-]",
                self.run_id
            )));
        }
        Ok(())
    }

    /// `<input dir>/<input stem><suffix>.json` unless an explicit output is set.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(p) => p.clone(),
            None => self
                .input
                .with_file_name(format!("{}{}.json", self.base_name(), self.suffix)),
        }
    }

    pub fn base_name(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string())
    }

    /// Copy with every path resolved against the current directory.
    ///
    /// The manifest records these paths, so `merge` works from any directory.
    pub fn absolute(&self) -> Result<Self, CoreError> {
        let mut cfg = self.clone();
        cfg.input = absolute(&self.input)?;
        cfg.workdir = absolute(&self.workdir)?;
        cfg.label_catalog = self.label_catalog.as_deref().map(absolute).transpose()?;
        cfg.output = self.output.as_deref().map(absolute).transpose()?;
        Ok(cfg)
    }

    pub fn layout(&self) -> RunLayout {
        RunLayout::new(&self.workdir, self.base_name(), self.run_id.clone())
    }
}

/// Short random run id (12 hex characters).
pub fn generate_run_id() -> RunId {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Number of GPUs the NVIDIA kernel driver reports, or `None` when the driver is not loaded.
pub fn installed_gpu_count() -> Option<usize> {
    let entries = std::fs::read_dir("/proc/driver/nvidia/gpus").ok()?;
    Some(entries.filter_map(Result::ok).count())
}

/// Every requested id must name one of the `installed` devices.
pub fn check_installed(gpus: &GpuSet, installed: usize) -> Result<(), CoreError> {
    match gpus.iter().find(|g| g.0 as usize >= installed) {
        Some(gpu) => Err(CoreError::Config(format!(
            "gpu {gpu} requested but only {installed} installed"
        ))),
        None => Ok(()),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, CoreError> {
    std::path::absolute(path).map_err(|e| CoreError::io(path, e))
}

fn parent_or_cwd(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
