use clap::{Arg, Command};
use std::io::{self, Write};

const STATUSES: [&str; 4] = ["planned", "active", "completed", "paused"];

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a synthetic strategic_goals CSV to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("invalid_every")
                .long("invalid-every")
                .help("Emit a row with an out-of-range progress every N rows")
                .value_parser(clap::value_parser!(u64)),
        )
        .get_matches();

    let rows: u64 = matches.get_one::<u64>("rows").copied().unwrap_or_default();
    let invalid_every = matches.get_one::<u64>("invalid_every").copied();

    let mut out = io::BufWriter::new(io::stdout().lock());
    writeln!(
        &mut out,
        "name,description,status,progress,target_value,current_value,start_date,due_date"
    )?;

    // deterministic data so runs can be compared
    for i in 0..rows {
        let status = STATUSES[(i % STATUSES.len() as u64) as usize];
        let bad = invalid_every.is_some_and(|n| n > 0 && (i + 1) % n == 0);
        let progress = if bad { 101 } else { i % 101 };
        writeln!(
            &mut out,
            "Goal {i:06},\"Grow segment {i}, phase {}\",{status},{progress},{},{},2026-01-01,2026-12-31",
            i % 4 + 1,
            (i + 1) * 1000,
            i * 10,
        )?;
        if i % 10_000 == 0 {
            out.flush()?;
        }
    }

    out.flush()?;
    Ok(())
}
