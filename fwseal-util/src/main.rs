mod cli;

use clap::Parser;
use cli::{Cli, Command};
use fwseal_util::{BatchVerifier, ConsoleProgress, FileReport, SilentProgress};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use snafu::{ResultExt, Snafu};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Top-level application errors for fwseal.
#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to open image '{}'", path.display()))]
    OpenImage {
        path: PathBuf,
        source: fwseal_util::OpenImageError,
    },

    #[snafu(display("failed to reseal image '{}'", path.display()))]
    Reseal {
        path: PathBuf,
        source: fwseal_util::ResealFileError,
    },

    #[snafu(display("cannot compare '{}' with '{}'", original.display(), modified.display()))]
    Diagnose {
        original: PathBuf,
        modified: PathBuf,
        source: fwseal::FormatError,
    },

    #[snafu(display("{count} of {total} images failed verification"))]
    VerifyFailed { count: usize, total: usize },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[snafu::report]
fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_level.map(Into::into));

    match cli.command {
        Command::Info { image_path } => cmd_info(&image_path),
        Command::Verify { image_paths, quiet } => cmd_verify(&image_paths, quiet),
        Command::Reseal {
            image_path,
            output,
            in_place,
        } => cmd_reseal(&image_path, output.as_deref(), in_place),
        Command::Diagnose { original, modified } => cmd_diagnose(&original, &modified),
    }
}

fn init_logging(verbose: u8, level: Option<LevelFilter>) {
    let level = level.unwrap_or(match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });

    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Trace)
        .build();

    // Only fails if a logger is already installed.
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto);
}

fn cmd_info(path: &Path) -> Result<()> {
    let image = unsafe { fwseal_util::open_image(path).context(OpenImageSnafu { path })? };
    let header = image.header();

    println!("Image: {}", path.display());
    println!();
    println!("Size:           {} bytes", image.len());
    println!("Magic:          0x{:02X}", header.magic());
    println!("Segment Count:  {}", header.segment_count());
    println!("Header Tail:    {}", hex::encode(header.header_tail()));
    println!("Extension:      {}", hex::encode(header.extension()));
    println!("Segments End:   0x{:X}", image.segments_end());
    println!(
        "Checksum:       0x{:02X} @ 0x{:X}",
        image.stored_checksum(),
        image.checksum_offset()
    );
    println!(
        "Digest:         {} @ 0x{:X}",
        hex::encode(image.stored_digest()),
        image.trailer_start()
    );
    println!();
    println!("{:>5}  {:>10}  {:>10}  {:>10}", "Index", "Offset", "Load Addr", "Size");
    println!("{:-<5}  {:-<10}  {:-<10}  {:-<10}", "", "", "", "");

    for segment in image.segments() {
        println!(
            "{:>5}  0x{:08X}  0x{:08X}  {:>10}",
            segment.index(),
            segment.offset(),
            segment.load_address(),
            segment.len()
        );
    }

    Ok(())
}

fn cmd_verify(paths: &[PathBuf], quiet: bool) -> Result<()> {
    let reports = if quiet {
        BatchVerifier::new(SilentProgress).verify(paths)
    } else {
        BatchVerifier::new(ConsoleProgress::new()).verify(paths)
    };

    for report in &reports {
        print_report(report);
    }

    let count = reports.iter().filter(|r| !r.is_consistent()).count();
    snafu::ensure!(
        count == 0,
        VerifyFailedSnafu {
            count,
            total: reports.len()
        }
    );

    Ok(())
}

fn print_report(report: &FileReport) {
    println!("{}:", report.path.display());
    match &report.result {
        Ok(verification) => {
            println!("{verification}");
            println!("Result: {}", verification.findings());
        }
        Err(e) => println!("Error: {}", snafu::Report::from_error(e)),
    }
    println!();
}

fn cmd_reseal(path: &Path, output: Option<&Path>, in_place: bool) -> Result<()> {
    let report = if in_place {
        unsafe { fwseal_util::reseal_file_in_place(path).context(ResealSnafu { path })? }
    } else {
        let output = match output {
            Some(output) => output.to_path_buf(),
            None => default_output(path),
        };
        let report =
            fwseal_util::reseal_file(path, Some(&output)).context(ResealSnafu { path })?;
        println!("Wrote {}", output.display());
        report
    };

    println!("{report}");
    if !report.changed() {
        println!("Image was already sealed.");
    }

    Ok(())
}

fn default_output(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".resealed");
    PathBuf::from(name)
}

fn cmd_diagnose(original: &Path, modified: &Path) -> Result<()> {
    let original_data =
        fwseal_util::read_image(original).context(OpenImageSnafu { path: original })?;
    let modified_data =
        fwseal_util::read_image(modified).context(OpenImageSnafu { path: modified })?;

    let diagnosis = fwseal::diagnose(&original_data, &modified_data)
        .context(DiagnoseSnafu { original, modified })?;

    println!("{diagnosis}");

    Ok(())
}
