//! Library for verifying and resealing firmware image files.
//!
//! This crate is the file-system side of [`fwseal`]: it loads images from
//! disk, verifies batches of them in parallel and writes resealed images back.
//!
//! # Example
//!
//! ```no_run
//! use fwseal_util::{BatchVerifier, SilentProgress, reseal_file};
//! use std::path::{Path, PathBuf};
//!
//! let report = reseal_file(Path::new("firmware.bin"), Some(Path::new("firmware.new.bin")))
//!     .expect("reseal failed");
//! println!("{report}");
//!
//! let files = vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")];
//! for file in BatchVerifier::new(SilentProgress).verify(&files) {
//!     println!("{}: {:?}", file.path.display(), file.result.map(|v| v.findings()));
//! }
//! ```
//!
//! # Custom progress reporting
//!
//! Implement the [`VerifyProgress`] trait to receive updates while a batch is
//! verified.

pub mod error;
pub mod progress;
pub mod verify;

pub use self::error::{OpenImageError, ResealFileError};
pub use self::progress::{SilentProgress, VerifyProgress};
pub use self::verify::{BatchVerifier, FileReport};

#[cfg(feature = "cli")]
pub use self::progress::ConsoleProgress;

use self::error::*;
use fwseal::{ParsedImage, Resealed};
use snafu::ResultExt;
use std::fs::OpenOptions;
use std::path::Path;

/// Opens an image from disk using a memory-mapped read.
///
/// # Safety
///
/// This function uses `unsafe` internally to create a memory map. The caller
/// must ensure the file is not modified or truncated while the returned image
/// is in use.
pub unsafe fn open_image(path: &Path) -> Result<ParsedImage<memmap2::Mmap>, OpenImageError> {
    let file = std::fs::File::open(path).context(OpenFileSnafu { path })?;
    let raw = unsafe { memmap2::Mmap::map(&file).context(MmapFileSnafu { path })? };
    fwseal::parse(raw).context(ParseImageSnafu { path })
}

/// Reads a whole image into memory without parsing it.
pub fn read_image(path: &Path) -> Result<Vec<u8>, OpenImageError> {
    std::fs::read(path).context(ReadFileSnafu { path })
}

/// Reseals the image at `input` and writes the result to `output`.
///
/// When `output` is `None` the input file is replaced. Nothing is written if
/// the image cannot be parsed.
pub fn reseal_file(input: &Path, output: Option<&Path>) -> Result<Resealed, ResealFileError> {
    let mut image = read_image(input).context(LoadImageSnafu)?;
    let report = fwseal::reseal_in_place(&mut image).context(ResealSnafu { path: input })?;

    let output = output.unwrap_or(input);
    std::fs::write(output, &image).context(WriteImageSnafu { path: output })?;

    log::info!(
        "resealed {} -> {} (checksum 0x{:02X})",
        input.display(),
        output.display(),
        report.new_checksum
    );

    Ok(report)
}

/// Reseals the image at `path` through a writable memory map.
///
/// The image is validated before anything is written, so a malformed file is
/// left as it was.
///
/// # Safety
///
/// The caller must ensure no other process modifies or truncates the file
/// while it is mapped.
pub unsafe fn reseal_file_in_place(path: &Path) -> Result<Resealed, ResealFileError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .context(OpenFileSnafu { path })
        .context(LoadImageSnafu)?;

    let mut map = unsafe {
        memmap2::MmapMut::map_mut(&file)
            .context(MmapFileSnafu { path })
            .context(LoadImageSnafu)?
    };

    let report = fwseal::reseal_in_place(&mut map).context(ResealSnafu { path })?;
    map.flush().context(FlushImageSnafu { path })?;

    log::info!(
        "resealed {} in place (checksum 0x{:02X})",
        path.display(),
        report.new_checksum
    );

    Ok(report)
}
