use anyhow::{Context, Result};
use capture_replay::record::encode_record;
use capture_replay::{Record, ReplayConfig, ReplayEngine, StopReason};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver};
use dotenvy::dotenv;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(version, about = "Replay recorded request/response captures in original order and timing")]
struct Args {
    /// Capture file or glob pattern (e.g. "captures/requests_*.log.gz")
    #[arg(long, short = 'i', env = "REPLAY_INPUT")]
    input: String,

    /// Replay speed: 2.0 halves captured gaps, 0.5 doubles them
    #[arg(long, env = "REPLAY_SPEED", default_value_t = 1.0)]
    speed: f64,

    /// Start over from the pattern once every capture is exhausted
    #[arg(long = "loop", env = "REPLAY_LOOP", default_value_t = false)]
    looping: bool,

    /// Output file for replayed records; defaults to stdout
    #[arg(long, env = "REPLAY_OUT")]
    out: Option<PathBuf>,
}

fn open_output(out: Option<&PathBuf>) -> Result<Box<dyn Write + Send>> {
    let Some(path) = out else {
        return Ok(Box::new(io::stdout()));
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).ok();
        }
    }
    let file: File = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("open output {path:?}"))?;
    Ok(Box::new(file))
}

fn writer_thread(sink: Box<dyn Write + Send>, rx: Receiver<Record>) -> Result<u64> {
    let mut w = BufWriter::with_capacity(1 << 20, sink); // 1 MiB buffer
    let mut written = 0u64;
    for record in rx {
        encode_record(&mut w, record.data())?;
        written += 1;
    }
    w.flush()?;
    Ok(written)
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    capture_replay::logging::init();
    let args = Args::parse();

    let config = ReplayConfig::default().with_speed_factor(args.speed).with_looping(args.looping);
    let sink = open_output(args.out.as_ref())?;
    let mut engine = ReplayEngine::start(args.input.clone(), config).with_context(|| "start capture replay")?;
    info!("{engine}");

    let stop = engine.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("install Ctrl-C handler")?;

    let (tx, rx) = bounded::<Record>(1024);
    let writer = std::thread::spawn(move || writer_thread(sink, rx));

    let mut outcome = Ok(());
    for record in engine.records() {
        match record {
            Ok(record) => {
                if tx.send(record).is_err() {
                    // Writer died; its error is reported on join.
                    engine.stop();
                    break;
                }
            }
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    drop(tx);

    let written = match writer.join() {
        Ok(res) => res.context("write replayed records")?,
        Err(_) => anyhow::bail!("writer thread panicked"),
    };
    let summary = engine.wait();
    outcome.context("capture replay failed")?;

    if let Some(summary) = summary {
        if let StopReason::Failed(reason) = &summary.reason {
            error!(%reason, "replay pump failed");
        }
        eprintln!(
            "Replayed {} records ({} written, {} restarts, stop reason: {:?}).",
            summary.emitted, written, summary.restarts, summary.reason
        );
    }
    Ok(())
}
