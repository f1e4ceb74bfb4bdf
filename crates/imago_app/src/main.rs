//! Imago - raw device imaging tool.
//!
//! Non-interactive CLI front end over `imago_core`/`imago_io`: images a
//! block device or file into a raw output file with progress, digests and
//! Ctrl-C cooperative stop. Device selection, write blocking and carving
//! live in sibling tools.

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use humansize::{BINARY, format_size};
use imago_core::{
    DEFAULT_BLOCK_SIZE, DigestAlgorithm, DigestReport, ImagingConfig, ImagingJob, JobResult,
};
use imago_io::DiskSource;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "imago")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source block device or image file to read.
    #[arg(short, long)]
    device: String,

    /// Destination path for the raw image.
    #[arg(short, long)]
    output: PathBuf,

    /// Copy block size in bytes; must be a multiple of the device's
    /// native block size.
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// Parallel reader count; 0 selects one per CPU.
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Hash the source stream independently and compare digests at the end.
    #[arg(long, default_value_t = false)]
    verify: bool,

    /// Digest algorithms to compute (md5, sha1, sha256).
    #[arg(
        long = "digest",
        value_delimiter = ',',
        default_values_t = DigestAlgorithm::ALL
    )]
    digests: Vec<DigestAlgorithm>,

    /// Skip writing the JSON imaging report next to the image.
    #[arg(long, default_value_t = false)]
    no_report: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let source = DiskSource::open(&args.device)
        .with_context(|| format!("Failed to open source: {}", args.device))?;
    let device = source.device();

    println!(
        "Imaging {} ({}) -> {}",
        device.identity,
        device.human_size(),
        args.output.display()
    );

    let workers = if args.workers == 0 {
        num_cpus::get()
    } else {
        args.workers
    };

    let mut config = ImagingConfig::new(args.output.clone());
    config.block_size = args.block_size;
    config.parallelism = workers;
    config.verify = args.verify;
    config.algorithms = args.digests.clone();
    let block_size = config.block_size;

    let job = ImagingJob::new(device.clone(), config)?;
    let started = Instant::now();
    let handle = job.start(source)?;

    let remote = handle.remote();
    ctrlc::set_handler(move || {
        if remote.stop() {
            info!("stop requested, waiting for in-flight reads to settle");
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    let bar = ProgressBar::new(device.size_bytes);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:50.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .expect("invalid progress bar template - this is a bug")
            .progress_chars("##-"),
    );

    for sample in handle.progress().iter() {
        bar.set_position(sample.bytes_done);
    }
    bar.finish_and_clear();

    let elapsed = started.elapsed().as_secs_f64();
    match handle.wait() {
        JobResult::Completed {
            bytes_written,
            image_digests,
            source_digests,
            verified,
        } => {
            let average = if elapsed > 0.0 {
                bytes_written as f64 / elapsed
            } else {
                0.0
            };
            println!(
                "\nCopied {} in {} ({})",
                format_size(bytes_written, BINARY),
                format_duration(elapsed),
                format_speed(average)
            );

            print_digests("Image digests", &image_digests);
            if let Some(digests) = &source_digests {
                print_digests("Source digests", digests);
            }
            match verified {
                Some(true) => println!("\nDigests match. The image is verified."),
                Some(false) => println!("\nDigests do not match. The image is corrupted."),
                None => {}
            }

            if !args.no_report {
                let report_path = report::write_report(
                    &device,
                    &args.output,
                    block_size,
                    workers,
                    bytes_written,
                    elapsed,
                    &image_digests,
                    source_digests.as_ref(),
                    verified,
                )
                .context("Failed to write imaging report")?;
                println!("Report saved to {}", report_path.display());
            }
        }
        JobResult::Stopped { bytes_written } => {
            println!(
                "\nStopped after {}. Partial image left at {}",
                format_size(bytes_written, BINARY),
                args.output.display()
            );
        }
        JobResult::Failed {
            error,
            bytes_written,
        } => {
            return Err(anyhow::Error::new(error).context(format!(
                "Imaging failed after {} written",
                format_size(bytes_written, BINARY)
            )));
        }
    }

    Ok(())
}

fn print_digests(title: &str, digests: &DigestReport) {
    println!("\n{title}:");
    for (algorithm, hex) in digests.entries() {
        println!("  {:<8} {}", format!("{}:", algorithm.display_name()), hex);
    }
}

fn format_speed(bytes_per_second: f64) -> String {
    format!("{}/s", format_size(bytes_per_second as u64, BINARY))
}

/// HH:MM:SS, hours unbounded.
fn format_duration(seconds: f64) -> String {
    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
