//! Measures durable-write latency by repeatedly committing a timestamp
//! payload to one target path.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use commit_file::CommittedFile;

/// Repeatedly replaces a file's contents, timing each durable commit.
#[derive(Debug, Parser)]
#[command(name = "commitfile", version)]
struct Cli {
    /// Target file to replace on every iteration.
    filename: PathBuf,

    /// Number of commits to run.
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    count: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.print().ok();
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            // Historical contract: bad arguments report usage and exit 0.
            println!("Usage: commitfile <filename> <count>");
            return ExitCode::SUCCESS;
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("commitfile: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    for i in 0..cli.count {
        log::debug!("commit {} of {} to {}", i + 1, cli.count, cli.filename.display());
        write_once(&cli.filename)?;
    }
    Ok(())
}

/// One timed iteration: construct (running stale cleanup), then commit a
/// fresh timestamp. The timer covers both, fsyncs included.
fn write_once(filename: &Path) -> Result<()> {
    let _timer = ElapsedTimer::new("Write file");
    let file = CommittedFile::new(filename)?;
    file.write(timestamp_payload().as_bytes())?;
    Ok(())
}

/// Current local time in the classic `ctime` layout, newline-terminated.
fn timestamp_payload() -> String {
    chrono::Local::now().format("%a %b %e %H:%M:%S %Y\n").to_string()
}

/// Reports how long an operation took when dropped, so early returns and
/// error paths are timed the same as successes.
struct ElapsedTimer {
    operation: &'static str,
    start: Instant,
}

impl ElapsedTimer {
    fn new(operation: &'static str) -> ElapsedTimer {
        ElapsedTimer {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for ElapsedTimer {
    fn drop(&mut self) {
        println!(
            "Operation \"{}\" took {}ms to complete.",
            self.operation,
            self.start.elapsed().as_millis()
        );
    }
}
