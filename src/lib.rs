pub mod config;
pub mod embed;
mod error;
pub mod merge;
pub mod package;
pub mod replace;
pub mod toc;
pub mod wml;
pub mod xml;

pub use config::ComposeConfig;
pub use embed::{Degraded, EmbedOutcome, ImageEmbedder, ImageItem, InsertedImage, Target};
pub use error::{DecodeError, EncodeError, Error, MergeError, Warning};
pub use merge::{Composer, IdRemapTable, MergeOutput, merge, merge_files};
pub use package::{Package, unique_output_path};
pub use replace::{PlaceholderMap, Replacement, replace};
pub use toc::{TOC_TITLE, TOC_TOKEN, insert_toc_at};

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Everything needed to fill one template.
#[derive(Clone, Debug, Default)]
pub struct FillRequest {
    pub values: PlaceholderMap,
    /// Token → single picture (with optional caption).
    pub images: Vec<(String, ImageItem)>,
    /// Token → list of pictures; an empty list only removes the token.
    pub image_lists: Vec<(String, Vec<ImageItem>)>,
    /// Replace `#toc#` with a table of contents.
    pub toc: bool,
    pub config: ComposeConfig,
}

#[derive(Clone, Debug)]
pub struct Report {
    /// Path actually written; differs from the requested one on collision.
    pub output: PathBuf,
    pub warnings: Vec<Warning>,
}

/// Load `template`, insert images, the table of contents and placeholder
/// values, and save next to `output` without overwriting an existing file.
pub fn fill_template(template: &Path, output: &Path, request: &FillRequest) -> Result<Report, Error> {
    let t0 = Instant::now();

    let mut pkg = Package::load(template)?;
    let t_load = t0.elapsed();

    let mut warnings = Vec::new();
    let embedder = ImageEmbedder::new(request.config.clone());
    for (token, item) in &request.images {
        let token = replace::wrap_key(token);
        match embedder.insert_by_keyword(&mut pkg, &token, &item.path, item.caption.as_deref()) {
            Some(outcome) => warnings.extend(outcome.warning()),
            None => log::warn!("Image placeholder {token} not found"),
        }
    }
    for (token, items) in &request.image_lists {
        let token = replace::wrap_key(token);
        match embedder.insert_list(&mut pkg, &token, items) {
            Some(outcomes) => warnings.extend(outcomes.iter().filter_map(EmbedOutcome::warning)),
            None => log::warn!("Image list placeholder {token} not found"),
        }
    }
    if request.toc {
        insert_toc_at(&mut pkg, TOC_TOKEN, TOC_TITLE)?;
    }
    replace(&mut pkg, &request.values, request.config.risk_color);
    let t_edit = t0.elapsed();

    let written = pkg.save_unique(output)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: load={:.1}ms, edit={:.1}ms, save={:.1}ms, total={:.1}ms ({} warnings)",
        t_load.as_secs_f64() * 1000.0,
        (t_edit - t_load).as_secs_f64() * 1000.0,
        (t_total - t_edit).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        warnings.len(),
    );

    Ok(Report {
        output: written,
        warnings,
    })
}

/// Merge `inputs` in order and save next to `output` without overwriting an
/// existing file.
pub fn merge_documents<P: AsRef<Path>>(inputs: &[P], output: &Path, add_page_breaks: bool) -> Result<Report, Error> {
    let t0 = Instant::now();

    let merged = merge_files(inputs, add_page_breaks)?;
    let t_merge = t0.elapsed();

    let written = merged.package.save_unique(output)?;
    let t_total = t0.elapsed();

    log::info!(
        "Timing: merge={:.1}ms, save={:.1}ms, total={:.1}ms ({} warnings)",
        t_merge.as_secs_f64() * 1000.0,
        (t_total - t_merge).as_secs_f64() * 1000.0,
        t_total.as_secs_f64() * 1000.0,
        merged.warnings.len(),
    );

    Ok(Report {
        output: written,
        warnings: merged.warnings,
    })
}
