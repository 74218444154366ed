//! z64decompress - Command-line interface for Zelda 64 ROM decompression
//!
//! Rebuilds a compressed ROM into its uncompressed layout, or decodes a
//! single compressed file with `--individual`.

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use z64decompress::{
    codec, decompress_rom, ChecksumFixer, Codec, DecompressOptions, N64Checksum, NoChecksum,
    RomOptions, TableLayout,
};

#[derive(Parser)]
#[command(name = "z64decompress")]
#[command(about = "Decompress Zelda 64 ROMs and individual compressed files")]
#[command(version)]
struct Cli {
    /// Input ROM or compressed file
    input: PathBuf,

    /// Output file (defaults to INPUT with a `.decompressed.*` extension)
    output: Option<PathBuf>,

    /// Codec to use instead of detecting it from file headers
    #[arg(short, long, value_enum)]
    codec: Option<CliCodec>,

    /// The ROM uses a dmaext file table (requires --codec)
    #[arg(long)]
    dmaext: bool,

    /// Compressed files have no codec header
    #[arg(long)]
    headerless: bool,

    /// Decode a single compressed file instead of a ROM
    #[arg(short, long)]
    individual: bool,

    /// Do not update the header checksum
    #[arg(long)]
    no_checksum: bool,

    /// Force overwrite of output file
    #[arg(short, long)]
    force: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CliCodec {
    /// Yaz0
    Yaz,
    /// UCL (NRV2B)
    Ucl,
    /// In-place LZ4
    Lz4h,
    /// DEFLATE with optional zlib header
    Zlib,
}

impl From<CliCodec> for Codec {
    fn from(codec: CliCodec) -> Self {
        match codec {
            CliCodec::Yaz => Codec::Yaz0,
            CliCodec::Ucl => Codec::Ucl,
            CliCodec::Lz4h => Codec::Lz4h,
            CliCodec::Zlib => Codec::Zlib,
        }
    }
}

impl Cli {
    fn options(&self) -> DecompressOptions {
        let layout = if self.dmaext {
            TableLayout::DmaExt
        } else {
            TableLayout::Standard
        };
        DecompressOptions {
            rom: RomOptions {
                layout,
                codec: self.codec.map(Codec::from),
                headerless: self.headerless,
            },
            individual: self.individual,
        }
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output(&self.input, self.individual))
    }
}

fn default_output(input: &Path, individual: bool) -> PathBuf {
    if individual {
        input.with_extension("decompressed.bin")
    } else {
        input.with_extension("decompressed.z64")
    }
}

/// Writes log records to stderr
struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn log_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

fn init_logging(verbose: bool) {
    let level = log_level(verbose);
    if log::set_boxed_logger(Box::new(StderrLogger { level })).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Outcome of one invocation
struct Summary {
    output: PathBuf,
    input_size: usize,
    output_size: usize,
    detail: String,
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();
    let summary = process(cli)?;

    if !cli.quiet {
        println!("✓ Decompression successful!");
        println!("  Output: {}", summary.output.display());
        println!("  Input:  {} bytes", summary.input_size);
        println!("  Size:   {} bytes", summary.output_size);
        println!("  {}", summary.detail);
        println!("  Time:   {:.2?}", start_time.elapsed());
    }
    Ok(())
}

fn process(cli: &Cli) -> Result<Summary, Box<dyn std::error::Error>> {
    let options = cli.options();
    options.validate()?;

    if !cli.input.exists() {
        return Err(format!("Input file '{}' does not exist", cli.input.display()).into());
    }

    let output = cli.output_path();
    if output.exists() && !cli.force {
        return Err(format!(
            "Output file '{}' already exists. Use --force to overwrite",
            output.display()
        )
        .into());
    }

    if cli.verbose {
        println!(
            "Decompressing '{}' to '{}'",
            cli.input.display(),
            output.display()
        );
    }

    let data = fs::read(&cli.input)?;
    let input_size = data.len();

    let progress = spinner(cli.quiet, input_size);
    let result = if options.individual {
        decode_individual(&data, options.rom.codec)
    } else {
        let mut fixer: Box<dyn ChecksumFixer> = if cli.no_checksum {
            Box::new(NoChecksum)
        } else {
            Box::new(N64Checksum::new())
        };
        rebuild(&data, &options.rom, fixer.as_mut())
    };
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let (image, detail) = result?;

    fs::write(&output, &image)?;
    Ok(Summary {
        output,
        input_size,
        output_size: image.len(),
        detail,
    })
}

fn decode_individual(
    data: &[u8],
    codec: Option<Codec>,
) -> Result<(Vec<u8>, String), Box<dyn std::error::Error>> {
    let (output, stats) = codec::decompress_file(data, codec)?;
    let codec = stats.codec.map_or("unknown", |codec| codec.name());
    Ok((output, format!("Codec:  {codec}")))
}

fn rebuild(
    rom: &[u8],
    options: &RomOptions,
    fixer: &mut dyn ChecksumFixer,
) -> Result<(Vec<u8>, String), Box<dyn std::error::Error>> {
    let image = decompress_rom(rom, options, fixer)?;
    let stats = &image.stats;

    let mut codecs: Vec<_> = stats
        .codecs
        .iter()
        .map(|(codec, count)| format!("{codec} x{count}"))
        .collect();
    codecs.sort();
    let detail = format!(
        "Table:  {:#x}, {} entries ({} decoded, {} copied, {} skipped) {}",
        image.table_offset,
        image.entries,
        stats.decoded,
        stats.copied,
        stats.skipped,
        codecs.join(", ")
    );
    Ok((image.data, detail))
}

/// Spinner for large inputs, as the rebuild has no meaningful step count
fn spinner(quiet: bool, input_size: usize) -> Option<ProgressBar> {
    if quiet || input_size <= 1024 * 1024 {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message("Decompressing...");
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}
