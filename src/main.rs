use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use seekcache::{open_cached, Backing, Result, StreamOptions};

/// Random-access hex dumps of stdin
///
/// Ranges are visited in the order given, backwards included; stdin is read
/// only as far as the furthest range requires.
#[derive(Debug, Parser)]
#[command(name = "seekcat", version)]
struct Args {
    /// Cache pulled bytes in a temporary file instead of memory
    #[arg(long)]
    file_cache: bool,

    /// JSON file with stream options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ranges to dump, as OFFSET or OFFSET:LEN (LEN defaults to 16)
    #[arg(required = true, value_parser = parse_range)]
    ranges: Vec<(u64, usize)>,
}

fn parse_range(arg: &str) -> std::result::Result<(u64, usize), String> {
    let (offset, len) = match arg.split_once(':') {
        Some((offset, len)) => {
            let len = len.parse::<usize>().map_err(|e| format!("bad length '{len}': {e}"))?;
            (offset, len)
        }
        None => (arg, 16),
    };
    let offset = offset.parse::<u64>().map_err(|e| format!("bad offset '{offset}': {e}"))?;
    Ok((offset, len))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => StreamOptions::from_path(path)?,
        None => StreamOptions::default(),
    };
    if args.file_cache {
        options.backing = Backing::File { dir: None };
    }

    let mut reader = open_cached(io::stdin(), &options)?;
    let mut out = io::stdout().lock();

    for (offset, len) in args.ranges {
        let reached = reader.seek(SeekFrom::Start(offset))?;
        if reached < offset {
            writeln!(out, "{offset:08x}: <end of input at {reached}>")?;
            continue;
        }

        let mut data = Vec::with_capacity(len);
        reader.by_ref().take(len as u64).read_to_end(&mut data)?;

        for (row, line) in data.chunks(16).enumerate() {
            let hex: Vec<String> = line.iter().map(|b| format!("{b:02x}")).collect();
            writeln!(out, "{:08x}: {}", offset + row as u64 * 16, hex.join(" "))?;
        }
        if data.len() < len {
            writeln!(out, "{:08x}: <end of input>", offset + data.len() as u64)?;
        }
    }

    Ok(())
}
