use anyhow::{Context, Result};
use capture_replay::record::{split_records, Record};
use capture_replay::source::open_stream;
use clap::Parser;
use crc32fast::Hasher as Crc32;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Parser)]
#[command(about = "List the records of a capture file with their metadata")]
struct Args {
    /// Capture file to read (plain or .gz)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Print each record's payload after its metadata line
    #[arg(long, default_value_t = false)]
    dump: bool,
}

fn format_ts(nanos: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| format!("{nanos}ns"))
}

fn main() -> Result<()> {
    capture_replay::logging::init();
    let args = Args::parse();
    let stream = open_stream(&args.input).with_context(|| format!("open {:?}", args.input))?;

    let mut records = 0usize;
    let mut out_of_order = 0usize;
    let mut last_ts: Option<i64> = None;
    for raw in split_records(stream) {
        let raw = raw.with_context(|| format!("read record {} of {:?}", records, args.input))?;
        let record = Record::parse(raw);
        let meta = record.meta();

        let mut hasher = Crc32::new();
        hasher.update(record.data());
        let crc = hasher.finalize();

        if last_ts.is_some_and(|prev| meta.timestamp < prev) {
            out_of_order += 1;
        }
        last_ts = Some(meta.timestamp);

        println!(
            "#{records} type={:?} id={} ts={} len={} crc={crc:#010x}",
            meta.kind,
            meta.id,
            format_ts(meta.timestamp),
            record.data().len()
        );
        if args.dump {
            println!("{}", String::from_utf8_lossy(record.data()));
            println!("---");
        }
        records += 1;
    }

    eprintln!("Read {records} records, {out_of_order} with a timestamp older than their predecessor.");
    Ok(())
}
