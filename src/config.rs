use std::path::PathBuf;

/// Environment variable naming the directory relative image paths resolve
/// against.
pub const IMAGE_DIR_ENV: &str = "DOCX_COMPOSE_IMAGE_DIR";

#[derive(Clone, Debug, PartialEq)]
pub struct ComposeConfig {
    /// Base directory for relative image paths.
    pub image_base_dir: PathBuf,
    /// Maximum picture width in a body paragraph, in inches.
    pub paragraph_image_width: f64,
    /// Maximum picture width in a table cell without a usable `tcW`, in inches.
    pub cell_image_width: f64,
    pub page_breaks: bool,
    pub risk_color: bool,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            image_base_dir: PathBuf::from("."),
            paragraph_image_width: 6.0,
            cell_image_width: 5.5,
            page_breaks: true,
            risk_color: false,
        }
    }
}

impl ComposeConfig {
    /// Defaults, with the image directory taken from `DOCX_COMPOSE_IMAGE_DIR`
    /// when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(IMAGE_DIR_ENV).filter(|d| !d.is_empty()) {
            config.image_base_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_base_dir = dir.into();
        self
    }
}
