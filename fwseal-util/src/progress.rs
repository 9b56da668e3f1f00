use crate::error::OpenImageError;
use fwseal::Verification;
use std::path::Path;

/// Trait for receiving batch verification progress updates.
///
/// All methods take `&self` (not `&mut self`) so the progress reporter can be
/// shared across threads during parallel verification.
pub trait VerifyProgress: Send + Sync {
    /// Called once before any file is verified.
    fn batch_start(&self, _total: usize) {}

    /// Called when a file has been parsed and verified.
    fn file_verified(&self, _path: &Path, _verification: &Verification) {}

    /// Called when a file could not be opened or parsed.
    fn file_failed(&self, _path: &Path, _error: &OpenImageError) {}

    /// Called when every file has been processed.
    fn batch_completed(&self, _consistent: usize, _inconsistent: usize, _failed: usize) {}
}

/// A no-op progress implementation that discards all updates.
pub struct SilentProgress;

impl VerifyProgress for SilentProgress {}

/// Console progress reporter using an indicatif progress bar.
#[cfg(feature = "cli")]
pub struct ConsoleProgress {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            bar: indicatif::ProgressBar::hidden(),
        }
    }
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl VerifyProgress for ConsoleProgress {
    fn batch_start(&self, total: usize) {
        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} images [{elapsed_precise}]")
        {
            self.bar.set_style(style.progress_chars("━╸─"));
        }
        self.bar.reset();
    }

    fn file_verified(&self, _path: &Path, _verification: &Verification) {
        self.bar.inc(1);
    }

    fn file_failed(&self, _path: &Path, _error: &OpenImageError) {
        self.bar.inc(1);
    }

    fn batch_completed(&self, consistent: usize, inconsistent: usize, failed: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "Verified {} images: {consistent} consistent, {inconsistent} inconsistent, {failed} unreadable.",
            consistent + inconsistent + failed
        );
    }
}
