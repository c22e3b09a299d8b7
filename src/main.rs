// Axel '0vercl0k' Souchet - June 15 2025
//! The clairvoyance CLI: parse a kernel crash-dump, walk the page tables of a
//! directory table base and write the record out for the viewer.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clairvoyance::{DumpView, Gpa, Gxa, PageTableWalker, PhysicalMemory, Tape, write_record};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The dump path.
    dump_path: PathBuf,
    /// The directory table base the walk starts from (hexadecimal if
    /// `0x`-prefixed, decimal otherwise). Defaults to the dump's.
    directory_base: Option<Gpa>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let dump = DumpView::new(&args.dump_path)
        .with_context(|| format!("failed to parse the dump {}", args.dump_path.display()))?;

    let directory_base = args
        .directory_base
        .unwrap_or_else(|| dump.directory_table_base());

    let walker = PageTableWalker::new(&dump, directory_base)?;
    let tape = Tape::build(walker);
    info!(
        "{} pixels materialized off {directory_base}; they lay out on an order-{} hilbert curve",
        tape.len(),
        tape.order()
    );

    let stem = args
        .dump_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("dump");
    let record_path = PathBuf::from(format!("{stem}-{:x}.clairvoyance", directory_base.u64()));
    let file = File::create(&record_path)
        .with_context(|| format!("failed to create {}", record_path.display()))?;
    let mut writer = BufWriter::new(file);
    write_record(&mut writer, &tape).context("failed to write the record")?;
    writer.flush().context("failed to flush the record")?;
    info!("wrote {} regions into {}", tape.regions().len(), record_path.display());

    Ok(())
}
