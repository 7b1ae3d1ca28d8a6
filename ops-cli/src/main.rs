//! Pretty-printer for `ops::backoff::Policy` timetables.
//!
//! Reads a `Policy` as a comment-tolerant JSON superset (either from a file
//! or stdin), projects it onto a bounded or "until plateau" attempt count via
//! [`ops::backoff::Policy::timetable`], and renders either a human-readable
//! table or a compact struct-literal-style dump.

use anyhow::{Context, Result};
use clap::Parser;
use ops::backoff::{Policy, TimeTable};
use std::io::Read;
use std::path::PathBuf;

/// Render a backoff Policy's timetable.
#[derive(Parser)]
#[command(name = "ops-cli")]
#[command(about = "Render an ops::backoff::Policy timetable", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a JSON policy document. Reads stdin if omitted.
    #[arg(short, long)]
    policy: Option<PathBuf>,

    /// Number of attempts to project, or -1 for "until plateau".
    #[arg(short, long, default_value_t = 10)]
    attempts: i64,

    /// Render as a compact programmatic struct literal instead of a table.
    #[arg(long)]
    gostruct: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let raw = match &cli.policy {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading policy file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading policy JSON from stdin")?;
            buf
        }
    };

    let policy: Policy =
        serde_json::from_str(&strip_json_comments(&raw)).context("parsing policy JSON")?;
    let table = policy.timetable(cli.attempts);

    if cli.gostruct {
        print_gostruct(&table);
    } else {
        print_table(&table);
    }

    Ok(())
}

/// Strips `//` line comments and `/* ... */` block comments that live
/// outside string literals, a comment-tolerant JSON superset without
/// reaching for a dedicated JSON5/JSONC parser dependency.
fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn print_table(table: &TimeTable) {
    println!("{:>7}  {:>10}  {:>10}  {:>10}", "attempt", "interval", "min", "max");
    for entry in &table.entries {
        println!(
            "{:>7}  {:>10?}  {:>10?}  {:>10?}",
            entry.attempt, entry.interval, entry.min_interval, entry.max_interval
        );
    }
    println!();
    println!("min_time = {:?}, max_time = {:?}", table.min_time, table.max_time);
}

fn print_gostruct(table: &TimeTable) {
    print!("TimeTable{{MinTime: {:?}, MaxTime: {:?}, Entries: [", table.min_time, table.max_time);
    for (i, entry) in table.entries.iter().enumerate() {
        if i > 0 {
            print!(", ");
        }
        print!(
            "{{Attempt: {}, Interval: {:?}, MinInterval: {:?}, MaxInterval: {:?}}}",
            entry.attempt, entry.interval, entry.min_interval, entry.max_interval
        );
    }
    println!("]}}");
}
