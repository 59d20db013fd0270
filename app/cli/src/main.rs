use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use pktgen_kernels::kernels::signature::SIGNATURE_LEN;
use pktgen_kernels::{batch, KernelError, Signature, SignatureFlags, TimestampPosition};
use rayon::prelude::*;
use std::fs;
use std::io::{self, Read, Write};
use std::time::Instant;

/// Packet traffic kernels: test patterns, checksums and signatures
#[derive(Parser)]
#[command(name = "pktgen-kernels")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Payload patterns
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    /// Every byte the same value
    Const,
    /// Byte value counts up, wrapping at 256
    Incr,
    /// Byte value counts down, wrapping at 256
    Decr,
    /// PRBS23 test sequence
    Prbs,
}

impl Pattern {
    fn as_str(&self) -> &'static str {
        match self {
            Pattern::Const => "const",
            Pattern::Incr => "incr",
            Pattern::Decr => "decr",
            Pattern::Prbs => "prbs",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show which instruction set each kernel family resolved to
    Info {
        /// Emit the full report, with every candidate's latency, as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write payload frames filled with a pattern
    Fill {
        /// Output file (use '-' for stdout)
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        output: String,

        /// Pattern to write
        #[arg(short, long, value_enum, default_value = "prbs")]
        pattern: Pattern,

        /// Number of frames
        #[arg(short = 'n', long, default_value_t = 1)]
        frames: usize,

        /// Bytes per frame
        #[arg(short, long, default_value_t = 1500)]
        size: usize,

        /// Starting byte value, or PRBS seed (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_u32, default_value = "0x1")]
        seed: u32,
    },

    /// Count PRBS23 bit errors in each frame of a file
    Verify {
        /// Input file (use '-' for stdin)
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        input: String,

        /// Bytes per frame; every frame is checked on its own
        #[arg(short, long, default_value_t = 1500)]
        size: usize,

        /// Print bit errors for every frame, not just the total
        #[arg(long)]
        per_frame: bool,
    },

    /// Compute the IPv4 header and TCP/UDP checksums of a packet
    Checksum {
        /// Input file holding one IPv4 packet (use '-' for stdin)
        #[arg(short, long, value_name = "FILE", default_value = "-")]
        input: String,
    },

    /// Encode a batch of signatures, decode them back and check the result
    Signature {
        /// Number of signatures
        #[arg(short = 'n', long, default_value_t = 128)]
        count: usize,

        /// Stream ids cycle through 0..streams
        #[arg(long, default_value_t = 8)]
        streams: u32,

        /// Timestamp of the first signature
        #[arg(long, value_parser = parse_u64, default_value = "0")]
        timestamp: u64,

        /// Mark the payload as PRBS
        #[arg(long)]
        prbs: bool,

        /// Timestamps mark the last bit of the frame
        #[arg(long)]
        timestamp_last: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity flags
    setup_logging(cli.verbose, cli.quiet);

    // Execute the appropriate command
    match cli.command {
        Commands::Info { json } => info_command(json),
        Commands::Fill {
            output,
            pattern,
            frames,
            size,
            seed,
        } => fill_command(&output, pattern, frames, size, seed, cli.quiet),
        Commands::Verify {
            input,
            size,
            per_frame,
        } => verify_command(&input, size, per_frame, cli.quiet),
        Commands::Checksum { input } => checksum_command(&input),
        Commands::Signature {
            count,
            streams,
            timestamp,
            prbs,
            timestamp_last,
        } => signature_command(count, streams, timestamp, prbs, timestamp_last, cli.quiet),
    }
}

/// Set up logging based on verbosity flags
fn setup_logging(verbose: bool, quiet: bool) {
    let log_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    debug!("Logging initialized at {} level", log_level);
}

/// Parse a decimal or 0x-prefixed hexadecimal integer
fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("'{}' does not fit in 32 bits", s))
}

/// Read input from file or stdin
fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut buffer = Vec::new();
        io::stdin()
            .read_to_end(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else {
        fs::read(input).with_context(|| format!("Failed to read input file: {}", input))
    }
}

/// Write output to file or stdout
fn write_output(output: &str, content: &[u8]) -> Result<()> {
    if output == "-" {
        io::stdout()
            .write_all(content)
            .context("Failed to write to stdout")?;
        io::stdout().flush().context("Failed to flush stdout")?;
    } else {
        fs::write(output, content)
            .with_context(|| format!("Failed to write output file: {}", output))?;
    }
    Ok(())
}

/// Execute the info command
fn info_command(json: bool) -> Result<()> {
    let start_time = Instant::now();
    batch::init();
    debug!(
        "Resolved kernel families in {:.3}s",
        start_time.elapsed().as_secs_f64()
    );

    let mut stdout = io::stdout().lock();
    if json {
        let report = batch::dispatch_report();
        serde_json::to_writer_pretty(&mut stdout, &report)
            .context("Failed to write dispatch report")?;
        writeln!(stdout)?;
    } else {
        batch::dump_info(&mut stdout).map_err(|e| map_kernel_error(e, "Info dump"))?;
    }
    Ok(())
}

/// Execute the fill command
fn fill_command(
    output: &str,
    pattern: Pattern,
    frames: usize,
    size: usize,
    seed: u32,
    quiet: bool,
) -> Result<()> {
    let start_time = Instant::now();
    info!(
        "Filling {} frames of {} bytes with {} pattern",
        frames,
        size,
        pattern.as_str()
    );

    let total = frames
        .checked_mul(size)
        .context("Frame count times frame size overflows")?;
    let mut data = vec![0u8; total];

    let progress = create_progress_bar(quiet, "Filling");
    {
        let mut bufs: Vec<&mut [u8]> = data.chunks_mut(size.max(1)).collect();
        let value = seed as u8;
        match pattern {
            Pattern::Const => batch::fill_const(&mut bufs, value),
            Pattern::Incr => {
                batch::fill_incr(&mut bufs, value);
            }
            Pattern::Decr => {
                batch::fill_decr(&mut bufs, value);
            }
            Pattern::Prbs => {
                let next = batch::fill_prbs(&mut bufs, seed)
                    .map_err(|e| map_kernel_error(e, "PRBS fill"))?;
                debug!("Continuation seed: {:#08x}", next);
            }
        }
        if matches!(pattern, Pattern::Const | Pattern::Incr | Pattern::Decr) && seed > 0xff {
            warn!("Byte patterns use only the low 8 bits of the seed ({:#04x})", value);
        }
    }
    progress.finish_and_clear();

    write_output(output, &data)?;

    let duration = start_time.elapsed();
    if !quiet && output != "-" {
        eprintln!("✓ Fill complete");
        eprintln!("  Pattern:     {}", pattern.as_str());
        eprintln!("  Frames:      {}", frames);
        eprintln!("  Output:      {}", format_bytes(total));
        eprintln!("  Time:        {:.3}s", duration.as_secs_f64());
    }
    Ok(())
}

/// Execute the verify command
fn verify_command(input: &str, size: usize, per_frame: bool, quiet: bool) -> Result<()> {
    if size == 0 {
        anyhow::bail!("Frame size must be greater than zero");
    }
    let start_time = Instant::now();
    info!("Verifying PRBS frames of {} bytes from {}", size, input);

    let data = read_input(input)?;
    if data.is_empty() {
        warn!("Input is empty");
        return Ok(());
    }

    let progress = create_progress_bar(quiet, "Verifying");
    let frames: Vec<&[u8]> = data.chunks(size).collect();
    let mut bit_errors = vec![0u32; frames.len()];

    // Frames self-synchronize, so blocks of them can be checked in parallel.
    const FRAMES_PER_TASK: usize = 64;
    frames
        .par_chunks(FRAMES_PER_TASK)
        .zip(bit_errors.par_chunks_mut(FRAMES_PER_TASK))
        .try_for_each(|(frames, errors)| batch::verify_prbs(frames, errors).map(|_| ()))
        .map_err(|e| map_kernel_error(e, "PRBS verify"))?;
    progress.finish_and_clear();

    let total: u64 = bit_errors.iter().map(|&e| e as u64).sum();
    let bad_frames = bit_errors.iter().filter(|&&e| e > 0).count();
    debug!(
        "Verified {} frames in {:.3}s",
        frames.len(),
        start_time.elapsed().as_secs_f64()
    );

    if per_frame {
        for (i, errors) in bit_errors.iter().enumerate() {
            println!("frame {}: {} bit errors", i, errors);
        }
    }
    println!(
        "{} frames, {} with errors, {} bit errors",
        frames.len(),
        bad_frames,
        total
    );

    if total > 0 {
        anyhow::bail!("{} of {} frames have bit errors", bad_frames, frames.len());
    }
    Ok(())
}

/// Execute the checksum command
fn checksum_command(input: &str) -> Result<()> {
    let packet = read_input(input)?;
    debug!("Read {} bytes from input", packet.len());

    let mut header = [0u16; 1];
    batch::ipv4_header_checksums(&[&packet[..]], &mut header)
        .map_err(|e| map_kernel_error(e, "IPv4 header checksum"))?;
    let mut transport = [0u16; 1];
    batch::ipv4_tcpudp_checksums(&[&packet[..]], &mut transport)
        .map_err(|e| map_kernel_error(e, "TCP/UDP checksum"))?;

    println!("ipv4 header: {:#06x}", header[0]);
    println!("tcp/udp:     {:#06x}", transport[0]);
    Ok(())
}

/// Execute the signature command
fn signature_command(
    count: usize,
    streams: u32,
    timestamp: u64,
    prbs: bool,
    timestamp_last: bool,
    quiet: bool,
) -> Result<()> {
    if streams == 0 {
        anyhow::bail!("Stream count must be greater than zero");
    }
    let total = u32::try_from(count)
        .with_context(|| format!("Signature count {} exceeds the 32-bit sequence space", count))?;
    let flags = batch::pack_signature_flags(SignatureFlags {
        prbs,
        timestamp: if timestamp_last {
            TimestampPosition::Last
        } else {
            TimestampPosition::First
        },
        valid: false,
    });

    let stream_ids: Vec<u32> = (0..total).map(|i| i % streams).collect();
    let sequences: Vec<u32> = (0..total).map(|i| i / streams).collect();
    let mut records = vec![[0u8; SIGNATURE_LEN]; count];

    let start_time = Instant::now();
    {
        let mut dests: Vec<&mut [u8]> = records.iter_mut().map(|r| &mut r[..]).collect();
        batch::encode_signatures(&mut dests, &stream_ids, &sequences, flags, timestamp)
            .map_err(|e| map_kernel_error(e, "Signature encode"))?;
    }

    let candidates: Vec<&[u8]> = records.iter().map(|r| &r[..]).collect();
    let mut valid = vec![false; count];
    batch::signature_crc_filter(&candidates, &mut valid)
        .map_err(|e| map_kernel_error(e, "Signature CRC filter"))?;
    let mut decoded = vec![Signature::default(); count];
    let n = batch::decode_signatures(&candidates, &mut decoded)
        .map_err(|e| map_kernel_error(e, "Signature decode"))?;
    let duration = start_time.elapsed();

    let expected: Vec<Signature> = (0..count)
        .map(|i| {
            Signature::new(
                stream_ids[i],
                sequences[i],
                timestamp.wrapping_add(i as u64),
                flags,
            )
        })
        .collect();
    let valid_count = valid.iter().filter(|&&v| v).count();
    let mismatches = expected
        .iter()
        .zip(&decoded[..n])
        .filter(|(want, got)| want != got)
        .count();

    if !quiet {
        eprintln!("✓ Signature self-check");
        eprintln!("  Encoded:     {}", count);
        eprintln!("  CRC valid:   {}", valid_count);
        eprintln!("  Decoded:     {}", n);
        eprintln!("  Mismatches:  {}", mismatches);
        eprintln!("  Time:        {:.3}s", duration.as_secs_f64());
    }
    if let Some(first) = records.first() {
        debug!("First record: {}", hex(first));
    }

    if n != count || valid_count != count || mismatches > 0 {
        anyhow::bail!(
            "Signature self-check failed: {} encoded, {} valid, {} decoded, {} mismatched",
            count,
            valid_count,
            n,
            mismatches
        );
    }
    println!("{} signatures ok", count);
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Create a progress bar (spinner) for operations
fn create_progress_bar(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Format bytes in human-readable format
fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Map KernelError to anyhow::Error with context
fn map_kernel_error(error: KernelError, context: &str) -> anyhow::Error {
    match error {
        KernelError::LengthMismatch {
            what,
            expected,
            actual,
        } => anyhow::anyhow!(
            "{}: {} has {} entries, batch needs {}",
            context,
            what,
            actual,
            expected
        ),
        KernelError::BufferTooShort {
            index,
            len,
            required,
        } => anyhow::anyhow!(
            "{}: buffer {} is {} bytes, needs at least {}",
            context,
            index,
            len,
            required
        ),
        KernelError::CounterTooSmall {
            mask_index,
            len,
            required,
        } => anyhow::anyhow!(
            "{}: counters for mask {} hold {} buckets, need {}",
            context,
            mask_index,
            len,
            required
        ),
        KernelError::UnknownVariant(name) => {
            anyhow::anyhow!("{}: unknown instruction set '{}'", context, name)
        }
        KernelError::Io(e) => anyhow::anyhow!("{}: IO error: {}", context, e),
    }
}
