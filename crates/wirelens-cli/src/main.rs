//! wirelens - Inspect protobuf wire-format data without a schema
//!
//! This tool decodes raw protobuf buffers, shows every field with the bytes it
//! came from, and reconstructs a pseudo-schema naming each recurring message
//! shape.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;
use wirelens_core::decoder::DEFAULT_MAX_DEPTH;
use wirelens_core::schema::descriptor::DEFAULT_PACKAGE;
use wirelens_core::{
    ByteSpan, Capture, DecoderConfig, Framing, LengthPrefixed, Message, PrinterConfig, Session,
    Unframed,
};

/// Inspect protobuf wire-format data without a schema
#[derive(Parser, Debug)]
#[command(name = "wirelens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// How messages are delimited inside each input file
    #[arg(long, value_enum, default_value = "prefixed")]
    framing: FramingMode,

    /// Output format
    #[arg(long, value_enum, default_value = "fields")]
    format: OutputFormat,

    /// Only show the frame with this index
    #[arg(long)]
    frame: Option<usize>,

    /// Maximum nested message depth to decode
    #[arg(long, env = "WIRELENS_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Write the inferred schemas as an encoded FileDescriptorSet
    #[arg(long)]
    descriptor_out: Option<PathBuf>,

    /// Package name used for --descriptor-out
    #[arg(long, default_value = DEFAULT_PACKAGE)]
    package: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single capture file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of capture files, decoded in one session
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Framing convention of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FramingMode {
    /// Each message is preceded by a 2-byte big-endian length
    Prefixed,
    /// The whole file is one message
    #[value(name = "none")]
    Unframed,
}

/// Output format for decoded data
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Field tree with byte spans and values
    Fields,
    /// Reconstructed pseudo-schema
    Schema,
    /// Hex bytes grouped per top-level field
    Bytes,
}

/// Decodes inputs in one session and keeps what is needed for the summary
struct Inspector {
    session: Session,
    framing: Box<dyn Framing>,
    format: OutputFormat,
    frame: Option<usize>,
    roots: Vec<Message>,
    stats: InspectStats,
}

#[derive(Default)]
struct InspectStats {
    files: usize,
    frames: usize,
    partial: usize,
}

impl Inspector {
    fn new(cli: &Cli) -> Self {
        let framing: Box<dyn Framing> = match cli.framing {
            FramingMode::Prefixed => Box::new(LengthPrefixed),
            FramingMode::Unframed => Box::new(Unframed),
        };
        Self {
            session: Session::with_config(
                DecoderConfig::new().max_depth(cli.max_depth),
                PrinterConfig::default(),
            ),
            framing,
            format: cli.format,
            frame: cli.frame,
            roots: Vec::new(),
            stats: InspectStats::default(),
        }
    }

    /// Decode one buffer and write it in the selected format
    fn inspect(&mut self, name: &str, data: Bytes, out: &mut impl Write) -> Result<()> {
        let capture = self.session.inspect(data, self.framing.as_ref());
        self.stats.files += 1;

        if let Some(err) = &capture.framing_error {
            warn!("{}: framing stopped early: {}", name, err);
        }

        let selected: Vec<(usize, &Message)> = capture
            .frames
            .iter()
            .enumerate()
            .filter(|(i, _)| self.frame.map_or(true, |wanted| wanted == *i))
            .collect();

        if let Some(wanted) = self.frame {
            if selected.is_empty() {
                bail!(
                    "{}: frame {} requested but only {} found",
                    name,
                    wanted,
                    capture.frames.len()
                );
            }
        }

        debug!(
            "{}: {} frame(s), {} selected",
            name,
            capture.frames.len(),
            selected.len()
        );

        for (index, message) in &selected {
            self.stats.frames += 1;
            if !message.errors().is_empty() {
                self.stats.partial += 1;
            }
            match self.format {
                OutputFormat::Fields => {
                    writeln!(
                        out,
                        "{} frame {} @ {}: Message{}",
                        name, index, message.span, message.schema_id
                    )?;
                    write_fields(out, message, 1)?;
                }
                OutputFormat::Bytes => {
                    writeln!(out, "{} frame {} @ {}", name, index, message.span)?;
                    write_bytes(out, &capture, message)?;
                }
                OutputFormat::Schema => {}
            }
        }

        let selected: Vec<Message> = selected.into_iter().map(|(_, m)| m.clone()).collect();
        if self.format == OutputFormat::Schema && !selected.is_empty() {
            writeln!(out, "// {}", name)?;
            write!(out, "{}", self.session.render(&selected))?;
        }
        if let Some(err) = &capture.framing_error {
            writeln!(out, "! {}", err)?;
        }

        self.roots.extend(selected);
        Ok(())
    }

    fn write_descriptor(&self, path: &Path, package: &str) -> Result<()> {
        let schema = self
            .session
            .export(&self.roots, package)
            .context("Failed to build descriptor from inferred schemas")?;
        fs::write(path, schema.encode_descriptor_set())
            .with_context(|| format!("Failed to write descriptor: {}", path.display()))?;
        info!(
            "Wrote {} message type(s) to {}",
            schema.file().message_type.len(),
            path.display()
        );
        Ok(())
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} file(s), {} frame(s), {} partial, {} distinct schema(s)",
            self.stats.files,
            self.stats.frames,
            self.stats.partial,
            self.session.registry().len()
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut inspector = Inspector::new(&cli);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&mut inspector, file, &mut out)?;
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&mut inspector, directory, &mut out)?;
    } else {
        bail!("Either --file or --directory must be specified")
    }

    if let Some(ref path) = cli.descriptor_out {
        inspector.write_descriptor(path, &cli.package)?;
    }
    inspector.print_summary();

    Ok(())
}

/// Process a single capture file
fn process_single_file(
    inspector: &mut Inspector,
    file: &Path,
    out: &mut impl Write,
) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let data = read_capture(file)?;
    inspector.inspect(&file.display().to_string(), data, out)
}

/// Process every capture in a directory, recursively, in one session
fn process_directory(
    inspector: &mut Inspector,
    directory: &Path,
    out: &mut impl Write,
) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut files_processed = 0;

    // Sorted so schema ids do not depend on directory iteration order
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        // Skip directories
        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            trace!("Skipping hidden file: {}", path.display());
            continue;
        }

        let name = path.display().to_string();
        let result = read_capture(path).and_then(|data| inspector.inspect(&name, data, out));
        if let Err(e) = result {
            // Log error but continue with other files
            warn!("Error processing {}: {:#}", path.display(), e);
        }
        files_processed += 1;
    }

    info!("Processed {} file(s)", files_processed);
    Ok(())
}

fn read_capture(path: &Path) -> Result<Bytes> {
    trace!("Reading {}", path.display());
    let data = fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    trace!("Read {} bytes from {}", data.len(), path.display());
    Ok(Bytes::from(data))
}

/// Write one line per field, nested messages indented below their field
fn write_fields<W: Write>(out: &mut W, message: &Message, depth: usize) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    for field in &message.fields {
        writeln!(out, "{}{} [{}]", indent, field, field.span())?;
        if let Some(nested) = field.value.as_message() {
            write_fields(out, nested, depth + 1)?;
        }
    }
    if let Some(err) = &message.error {
        writeln!(out, "{}! {}", indent, err)?;
    }
    Ok(())
}

/// Write the bytes of each top-level field on its own line
fn write_bytes<W: Write>(out: &mut W, capture: &Capture, message: &Message) -> io::Result<()> {
    for field in &message.fields {
        writeln!(out, "  {}", hex(&capture.field_bytes(field)))?;
    }
    let rest = ByteSpan::new(message.decoded_span().end, message.span.end);
    if !rest.is_empty() {
        writeln!(out, "  {} (undecoded)", hex(&capture.bytes_of(rest)))?;
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
