use crate::error::SinkError;
use crate::frame::Image;
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Where presented frames go
pub trait FrameSink: Send {
    /// Show `image`. Called on every presenter iteration.
    fn render(&mut self, image: &Image) -> Result<(), SinkError>;

    /// Store `image` under `sequence`. Called only for frames the presenter claimed.
    fn persist(&mut self, image: &Image, sequence: u64) -> Result<PathBuf, SinkError>;
}

/// Writes persisted frames as numbered PNG files and optionally refreshes a
/// preview file with every rendered frame
pub struct ImageDirectorySink {
    output_dir: PathBuf,
    prefix: String,
    preview_path: Option<PathBuf>,
}

impl ImageDirectorySink {
    /// Create the sink, making `output_dir` if it does not exist
    pub fn create<P: AsRef<Path>>(
        output_dir: P,
        prefix: &str,
        preview_path: Option<PathBuf>,
    ) -> Result<Self, SinkError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        if !output_dir.exists() {
            fs::create_dir_all(&output_dir).map_err(|e| SinkError::Write {
                path: output_dir.display().to_string(),
                details: e.to_string(),
            })?;
            info!("Created output directory: {}", output_dir.display());
        }

        Ok(Self {
            output_dir,
            prefix: prefix.to_string(),
            preview_path,
        })
    }

    /// File a frame with `sequence` is persisted to
    pub fn path_for(&self, sequence: u64) -> PathBuf {
        self.output_dir
            .join(format!("{}_{:04}.png", self.prefix, sequence))
    }

    fn write_png(image: &Image, path: &Path) -> Result<(), SinkError> {
        image
            .to_dynamic()?
            .save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

impl FrameSink for ImageDirectorySink {
    fn render(&mut self, image: &Image) -> Result<(), SinkError> {
        let preview = match &self.preview_path {
            Some(path) => path,
            None => {
                trace!("Rendered {} frame (no preview configured)", image.geometry());
                return Ok(());
            }
        };

        // Replace atomically so watchers never read a half-written file
        let staging = preview.with_extension("tmp");
        Self::write_png(image, &staging)?;
        fs::rename(&staging, preview).map_err(|e| SinkError::Write {
            path: preview.display().to_string(),
            details: e.to_string(),
        })?;
        Ok(())
    }

    fn persist(&mut self, image: &Image, sequence: u64) -> Result<PathBuf, SinkError> {
        let path = self.path_for(sequence);
        Self::write_png(image, &path)?;
        debug!("Saved frame {} to {}", sequence, path.display());
        Ok(path)
    }
}
