use snafu::Snafu;
use std::path::PathBuf;

/// Errors that can occur when loading an image from disk.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OpenImageError {
    #[snafu(display("failed to open {}", path.display()))]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to memory map {}", path.display()))]
    MmapFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to read {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{} is not a valid firmware image", path.display()))]
    ParseImage {
        path: PathBuf,
        source: fwseal::FormatError,
    },
}

/// Errors that can occur when resealing an image file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResealFileError {
    #[snafu(display("failed to load image"))]
    LoadImage { source: OpenImageError },

    #[snafu(display("cannot reseal {}", path.display()))]
    Reseal {
        path: PathBuf,
        source: fwseal::FormatError,
    },

    #[snafu(display("cannot write {}", path.display()))]
    WriteImage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot flush {}", path.display()))]
    FlushImage {
        path: PathBuf,
        source: std::io::Error,
    },
}
