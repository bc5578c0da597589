//! weftcli: drive one splicing session from the command line.
//!
//! ```text
//! weftcli out/stream.m3u8 intro.wav silence:1.5 verse.wav outro.wav
//! ```
//!
//! Clips and silence are spliced in argument order onto one continuous
//! timeline; the playlist is finalized when the last operation is done.
//! A playlist that was written by an earlier run (and not finalized)
//! can be resumed by pointing a new run at it.

mod config;
mod ops;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use weft::{Session, SinkOptions};
use weft_hls::SegmentedSink;

use crate::ops::Op;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Playlist file to create or resume
    playlist: PathBuf,

    /// Operations in order: clip paths, or silence:SECONDS
    #[clap(required = true)]
    ops: Vec<String>,

    /// Segment file name template (printf style, e.g. seg_%03d.ts)
    #[clap(short, long)]
    template: Option<String>,

    /// Number of the first segment
    #[clap(short = 'n', long)]
    start_number: Option<u64>,

    /// Target duration of one segment, in seconds
    #[clap(short, long)]
    segment_seconds: Option<f64>,

    /// Config file with defaults (default: ./weft.toml when present)
    #[clap(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let ops = args
        .ops
        .iter()
        .map(|raw| ops::parse(raw))
        .collect::<Result<Vec<_>>>()?;

    debug!(operations = ops.len(), "operation list parsed");

    let defaults = config::load(args.config.as_deref())?;
    let fallback = SinkOptions::default();
    let options = SinkOptions {
        segment_seconds: args
            .segment_seconds
            .or(defaults.segment_seconds)
            .unwrap_or(fallback.segment_seconds),
        start_number: args
            .start_number
            .or(defaults.start_number)
            .unwrap_or(fallback.start_number),
        segment_template: args
            .template
            .or(defaults.template)
            .unwrap_or(fallback.segment_template),
    };

    let sink = SegmentedSink::create(&args.playlist)
        .with_context(|| format!("cannot open output {}", args.playlist.display()))?;
    let mut session = Session::start(Box::new(sink), options);

    for op in &ops {
        let report = match op {
            Op::Append(path) => session
                .append(path)
                .with_context(|| format!("failed to {op}"))?,
            Op::Silence(seconds) => session
                .insert_silence(*seconds)
                .with_context(|| format!("failed to {op}"))?,
        };
        println!("{op}: {report}");
    }

    session.finish().context("failed to finalize the output")?;
    println!("finalized {}", args.playlist.display());
    Ok(())
}
