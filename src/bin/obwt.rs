//! Online RLBWT driver: flatten a FASTA file, build the BWT one symbol
//! at a time, optionally serialise and verify it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{ensure, Context};
use clap::Parser;

use obwt::fasta::load_fasta;
use obwt::OnlineRlbwt;

/// End-marker byte appended after every sequence.
const EM: u8 = 1;

/// Terminator byte appended once before serialisation; written as `$`.
const TERM: u8 = 0;

#[derive(Parser)]
#[command(name = "obwt")]
#[command(version)]
#[command(about = "Online run-length BWT construction from FASTA input", long_about = None)]
struct Cli {
    /// Input FASTA file
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output BWT file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Use exact LF placement instead of the SAP-aware one
    #[arg(long)]
    exact: bool,

    /// Re-derive the text by inversion and compare with the input
    #[arg(long)]
    check: bool,

    /// Print size statistics after construction
    #[arg(long)]
    stats: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let started = Instant::now();
    let flat = load_fasta(&cli.input, EM)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    eprintln!(
        "loaded {} sequences, {} bytes in {:.2?}",
        flat.num_seqs,
        flat.text.len(),
        started.elapsed()
    );

    let building = Instant::now();
    let mut rlbwt = OnlineRlbwt::new(EM);
    for (i, &ch) in flat.text.iter().enumerate() {
        if cli.exact {
            rlbwt.extend(ch);
        } else {
            rlbwt.sap_extend(ch);
        }
        if (i + 1) % (1 << 20) == 0 {
            eprintln!("  {} / {} bytes", i + 1, flat.text.len());
        }
    }
    eprintln!(
        "built: {} rows, {} runs in {:.2?}",
        rlbwt.len_with_endmarker(),
        rlbwt.num_runs(),
        building.elapsed()
    );

    if cli.stats {
        eprintln!("heap: {} bytes", rlbwt.heap_bytes());
    }

    if cli.check {
        let mut recovered = Vec::with_capacity(flat.text.len());
        rlbwt.invert(&mut recovered)?;
        ensure!(
            recovered == flat.text,
            "inversion does not match the flattened input"
        );
        eprintln!("check: inversion matches");
    }

    if let Some(out) = &cli.output {
        // Final terminator before serialisation, as the builder's input
        // convention requires.
        if cli.exact {
            rlbwt.extend(TERM);
        } else {
            rlbwt.sap_extend(TERM);
        }
        let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
        let mut w = BufWriter::new(file);
        rlbwt.write_bwt(&mut w, Some((TERM, b'$')))?;
        w.flush()?;
        eprintln!("wrote {}", out.display());
    }

    Ok(())
}
