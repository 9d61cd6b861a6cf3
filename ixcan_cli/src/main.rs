use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use xxhash_rust::xxh3::xxh3_64;

use ixcan_core::format::BLOCK_SIZE;
use ixcan_core::{
    compact, CanError, CannedReader, CompactOptions, FormatOptions, Restorer,
};
use ixcan_sinks::{sink_for_path, MemorySink};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "can",
    about = "Can and uncan sparse MRF index files: drop the all-zero 512-byte blocks, keep a presence bitmap",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Generic input: skip the .idx / .ix name checks and the 16-byte size check
    #[arg(short, long, global = true)]
    generic: bool,
    /// Mark leading empty segments with the magic instead of a zero count
    #[arg(long, global = true)]
    sentinel: bool,
    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Can a raw index (.idx) into its compact form (.ix)
    Compact {
        /// Raw index file
        input: PathBuf,
        /// Destination canned file
        output: PathBuf,
    },
    /// Uncan a canned index back to the full-size raw index
    Restore {
        /// Canned file ("-" reads stdin)
        input: PathBuf,
        /// Destination raw index ("-" writes to stdout)
        output: PathBuf,
    },
    /// Print the canned header and directory statistics
    Inspect {
        /// Canned file to inspect
        file: PathBuf,
        /// Print every directory line
        #[arg(long)]
        segments: bool,
    },
    /// Look up a single raw block or index record without uncanning
    Locate {
        /// Canned file
        file: PathBuf,
        /// Zero-based raw block index
        #[arg(short, long, conflicts_with = "record", required_unless_present = "record")]
        block: Option<u64>,
        /// Zero-based 16-byte index record
        #[arg(short, long)]
        record: Option<u64>,
        /// Write the raw block to a file instead of printing a hex dump
        #[arg(short, long, requires = "block")]
        output: Option<PathBuf>,
    },
    /// Can and uncan a raw index in memory and compare xxh3 digests
    Verify {
        /// Raw index file
        input: PathBuf,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

fn usage(msg: impl Into<String>) -> anyhow::Error {
    CanError::Usage(msg.into()).into()
}

/// `out.tmp` next to `out`, renamed into place once a pass succeeds.
fn temp_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn format_options(cli: &Cli) -> FormatOptions {
    FormatOptions {
        empty_segment_sentinel: cli.sentinel,
    }
}

/// Run `write` against a temporary sibling of `out`, then rename it over `out`.
/// The temporary file is removed if `write` fails.
fn write_atomically<T>(
    out: &Path,
    write: impl FnOnce(&Path) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let tmp = temp_path(out);
    match write(&tmp) {
        Ok(v) => {
            fs::rename(&tmp, out).with_context(|| format!("renaming {:?} to {:?}", tmp, out))?;
            Ok(v)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compact(cli: &Cli, input: &Path, output: &Path) -> anyhow::Result<()> {
    if !cli.generic {
        if !has_extension(input, "idx") {
            return Err(usage("input file should have an .idx extension"));
        }
        if !has_extension(output, "ix") {
            return Err(usage("output file should have an .ix extension"));
        }
    }
    let opts = CompactOptions {
        format: format_options(cli),
        require_alignment: !cli.generic,
    };

    let file = File::open(input).with_context(|| format!("opening input file {:?}", input))?;
    let raw_size = file.metadata()?.len();
    let t0 = Instant::now();

    let summary = write_atomically(output, |tmp| {
        let out = File::create(tmp).with_context(|| format!("creating output file {:?}", tmp))?;
        compact(BufReader::new(file), raw_size, BufWriter::new(out), opts)
            .with_context(|| format!("canning {:?}", input))
    })?;
    let elapsed = t0.elapsed();

    if !cli.quiet {
        let ratio = raw_size as f64 / summary.canned_size.max(1) as f64;
        eprintln!("  raw size    : {}", human_bytes(summary.original_size));
        eprintln!("  blocks      : {} ({} stored)", summary.blocks, summary.stored_blocks);
        eprintln!("  directory   : {}", human_bytes(summary.directory_bytes));
        eprintln!("  canned      : {}", human_bytes(summary.canned_size));
        eprintln!("  ratio       : {:.2}x", ratio);
        eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    }
    Ok(())
}

fn run_restore(cli: &Cli, input: &Path, output: &Path) -> anyhow::Result<()> {
    if !cli.generic {
        if !is_stdio(input) && !has_extension(input, "ix") {
            return Err(usage("input file should have an .ix extension, or be -"));
        }
        if !is_stdio(output) && !has_extension(output, "idx") {
            return Err(usage("output file should have an .idx extension, or be -"));
        }
    }

    let src: Box<dyn Read> = if is_stdio(input) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(input).with_context(|| format!("opening input file {:?}", input))?,
        ))
    };

    // Header and directory are checked before the output is created.
    let restorer = Restorer::open(src, format_options(cli))
        .with_context(|| format!("reading canned file {:?}", input))?;
    debug!(
        original_size = restorer.header().original_size,
        "output size will be {}",
        restorer.header().original_size
    );

    let t0 = Instant::now();
    let summary = if is_stdio(output) {
        let mut sink = sink_for_path(output)?;
        restorer.restore_into(&mut sink)?
    } else {
        write_atomically(output, |tmp| {
            let mut sink =
                sink_for_path(tmp).with_context(|| format!("creating output file {:?}", tmp))?;
            restorer
                .restore_into(&mut sink)
                .with_context(|| format!("uncanning {:?}", input))
        })?
    };
    let elapsed = t0.elapsed();

    if !cli.quiet {
        eprintln!("  blocks      : {} ({} stored)", summary.blocks, summary.stored_blocks);
        eprintln!("  raw size    : {}", human_bytes(summary.original_size));
        eprintln!("  zero gaps   : {}", human_bytes(summary.zero_bytes));
        eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    }
    Ok(())
}

fn open_reader(cli: &Cli, file: &Path) -> anyhow::Result<CannedReader<BufReader<File>>> {
    let f = File::open(file).with_context(|| format!("opening canned file {:?}", file))?;
    let reader = CannedReader::open(BufReader::new(f), format_options(cli))
        .with_context(|| format!("reading canned file {:?}", file))?;
    Ok(reader)
}

fn run_inspect(cli: &Cli, file: &Path, show_segments: bool) -> anyhow::Result<()> {
    let reader = open_reader(cli, file)?;
    let file_size = fs::metadata(file)?.len();
    let header = reader.header;
    let dir = reader.directory();

    println!("=== Canned index: {:?} ===", file);
    println!();
    println!("  original size  : {} ({} bytes)", human_bytes(header.original_size), header.original_size);
    println!("  records        : {}", reader.record_count());
    println!("  blocks         : {}", reader.block_count());
    println!("  stored blocks  : {}", reader.stored_blocks());
    println!("  segments       : {}", dir.segment_count());
    println!("  directory      : {} ({} lines)", human_bytes(header.directory_bytes()), header.directory_units);
    println!("  file on disk   : {}", human_bytes(file_size));
    println!(
        "  ratio          : {:.2}x",
        header.original_size as f64 / file_size.max(1) as f64
    );

    if show_segments {
        println!();
        println!(
            "  {:>8}  {:>12}  {:>6}  {:>26}",
            "segment", "running", "bits", "mask (words 0 1 2)"
        );
        println!("  {}", "-".repeat(58));
        for (i, line) in dir.segments().iter().enumerate() {
            let running = if line.is_sentinel() {
                "sentinel".to_string()
            } else {
                line.running_count.to_string()
            };
            println!(
                "  {:>8}  {:>12}  {:>6}  {:08x} {:08x} {:08x}",
                i,
                running,
                line.count_ones(),
                line.mask[0],
                line.mask[1],
                line.mask[2]
            );
        }
    }

    Ok(())
}

fn run_locate(
    cli: &Cli,
    file: &Path,
    block: Option<u64>,
    record: Option<u64>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut reader = open_reader(cli, file)?;

    if let Some(k) = record {
        let rec = reader.read_record(k)?;
        println!("record {}: offset {} size {}", k, rec.offset, rec.size);
        return Ok(());
    }
    let Some(index) = block else {
        return Err(usage("give --block or --record"));
    };
    if index >= reader.block_count() {
        return Err(usage(format!(
            "block {} out of range, {:?} has {} blocks",
            index,
            file,
            reader.block_count()
        )));
    }

    match reader.stored_offset(index) {
        Some(offset) => eprintln!(
            "block {} is stored at offset {} ({} of {})",
            index,
            offset,
            (offset - reader.header.directory_bytes()) / BLOCK_SIZE,
            reader.stored_blocks()
        ),
        None => eprintln!("block {} is empty", index),
    }
    let raw = reader.read_block(index)?;

    match output {
        Some(path) => {
            fs::write(path, &raw).with_context(|| format!("writing {:?}", path))?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            // Print a hex dump of the first 256 bytes
            let preview = &raw[..raw.len().min(256)];
            println!("--- block {} ({} bytes, first {} shown) ---", index, raw.len(), preview.len());
            for (i, chunk) in preview.chunks(16).enumerate() {
                print!("  {:04x}  ", i * 16);
                for b in chunk {
                    print!("{:02x} ", b);
                }
                println!();
            }
            if raw.len() > 256 {
                println!("  ... ({} bytes remaining not shown)", raw.len() - 256);
            }
        }
    }

    Ok(())
}

fn run_verify(cli: &Cli, input: &Path) -> anyhow::Result<()> {
    let raw = fs::read(input).with_context(|| format!("reading input file {:?}", input))?;
    let opts = CompactOptions {
        format: format_options(cli),
        require_alignment: !cli.generic,
    };

    let mut canned = io::Cursor::new(Vec::new());
    let summary = compact(&raw[..], raw.len() as u64, &mut canned, opts)?;
    let canned = canned.into_inner();

    let mut sink = MemorySink::new();
    Restorer::open(&canned[..], opts.format)?.restore_into(&mut sink)?;

    let before = xxh3_64(&raw);
    let after = xxh3_64(sink.as_slice());
    if !cli.quiet {
        println!("  raw      : {} xxh3 {:016x}", human_bytes(raw.len() as u64), before);
        println!("  canned   : {} ({} blocks stored)", human_bytes(summary.canned_size), summary.stored_blocks);
        println!("  restored : {} xxh3 {:016x}", human_bytes(sink.as_slice().len() as u64), after);
    }
    if before != after || raw.len() != sink.as_slice().len() {
        anyhow::bail!("round trip of {:?} does not reproduce the input", input);
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// 1 for usage and format problems, 2 for I/O failures, 3 for anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CanError>() {
        Some(e) if e.is_usage_or_format() => 1,
        Some(_) => 2,
        None if err.downcast_ref::<io::Error>().is_some() => 2,
        None => 3,
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Compact { input, output } => run_compact(cli, input, output),
        Commands::Restore { input, output } => run_restore(cli, input, output),
        Commands::Inspect { file, segments } => run_inspect(cli, file, *segments),
        Commands::Locate {
            file,
            block,
            record,
            output,
        } => run_locate(cli, file, *block, *record, output.as_deref()),
        Commands::Verify { input } => run_verify(cli, input),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
