use crate::error::OpenImageError;
use crate::progress::VerifyProgress;
use fwseal::Verification;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::path::{Path, PathBuf};

/// Outcome of verifying one file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<Verification, OpenImageError>,
}

impl FileReport {
    /// Returns `true` if the file parsed and its checksum and digest are current.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.result.as_ref().is_ok_and(Verification::is_consistent)
    }
}

/// Verifies many image files in parallel.
pub struct BatchVerifier<P: VerifyProgress> {
    progress: P,
}

impl<P: VerifyProgress> BatchVerifier<P> {
    pub fn new(progress: P) -> Self {
        Self { progress }
    }

    /// Verifies every file in `paths`.
    ///
    /// Files are opened and hashed in parallel with rayon. Reports come back in
    /// the same order as `paths`; a file that cannot be opened does not stop
    /// the others.
    pub fn verify(&self, paths: &[PathBuf]) -> Vec<FileReport> {
        self.progress.batch_start(paths.len());

        let reports: Vec<FileReport> = paths
            .par_iter()
            .map(|path| FileReport {
                path: path.clone(),
                result: self.verify_one(path),
            })
            .collect();

        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        let consistent = reports.iter().filter(|r| r.is_consistent()).count();
        self.progress
            .batch_completed(consistent, reports.len() - consistent - failed, failed);

        reports
    }

    fn verify_one(&self, path: &Path) -> Result<Verification, OpenImageError> {
        // The map is dropped before returning and never outlives this call.
        let result = unsafe { crate::open_image(path) }.map(|image| image.verify());

        match &result {
            Ok(verification) => {
                if !verification.is_consistent() {
                    log::warn!("{}: {}", path.display(), verification.findings());
                }
                self.progress.file_verified(path, verification);
            }
            Err(e) => {
                log::warn!("{}: {e}", path.display());
                self.progress.file_failed(path, e);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SilentProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        verified: AtomicUsize,
        failed: AtomicUsize,
        summary: std::sync::Mutex<Option<(usize, usize, usize)>>,
    }

    impl VerifyProgress for &Counting {
        fn file_verified(&self, _path: &Path, _verification: &Verification) {
            self.verified.fetch_add(1, Ordering::Relaxed);
        }

        fn file_failed(&self, _path: &Path, _error: &OpenImageError) {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        fn batch_completed(&self, consistent: usize, inconsistent: usize, failed: usize) {
            *self.summary.lock().unwrap() = Some((consistent, inconsistent, failed));
        }
    }

    fn sealed_image() -> Vec<u8> {
        let mut data = vec![0xE9, 0x01];
        data.resize(24, 0);
        data.extend(0x4008_0000u32.to_le_bytes());
        data.extend(3u32.to_le_bytes());
        data.extend([1, 2, 3]);
        data.extend([0u8; 33]);
        fwseal::reseal(&data).unwrap()
    }

    #[test]
    fn reports_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.bin");
        let stale = dir.path().join("stale.bin");
        let missing = dir.path().join("missing.bin");

        let image = sealed_image();
        std::fs::write(&good, &image).unwrap();
        let mut edited = image.clone();
        edited[32] ^= 0xFF;
        std::fs::write(&stale, &edited).unwrap();

        let counting = Counting::default();
        let paths = vec![good.clone(), missing.clone(), stale.clone()];
        let reports = BatchVerifier::new(&counting).verify(&paths);

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].path, good);
        assert!(reports[0].is_consistent());
        assert!(matches!(
            reports[1].result,
            Err(OpenImageError::OpenFile { .. })
        ));
        assert!(!reports[2].is_consistent());
        assert!(reports[2].result.is_ok());

        assert_eq!(counting.verified.load(Ordering::Relaxed), 2);
        assert_eq!(counting.failed.load(Ordering::Relaxed), 1);
        assert_eq!(*counting.summary.lock().unwrap(), Some((1, 1, 1)));
    }

    #[test]
    fn empty_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.bin");
        std::fs::write(&empty, b"").unwrap();

        let reports = BatchVerifier::new(SilentProgress).verify(&[empty]);
        assert!(matches!(
            reports[0].result,
            Err(OpenImageError::ParseImage { .. }) | Err(OpenImageError::MmapFile { .. })
        ));
    }
}
