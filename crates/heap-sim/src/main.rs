//! Replays an allocation trace against a first-fit free list.

#![feature(error_generic_member_access)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::{fs, path::PathBuf, process};

use clap::Parser;
use free_list::FreeListConfig;
use log::{LevelFilter, info};
use snafu::{ResultExt as _, Snafu};
use snafu_utils::{Location, Report};

use self::sim::{SimError, Simulator};

mod sim;
mod trace;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Trace file to replay
    trace: PathBuf,

    /// Size of the simulated heap in words
    #[arg(long, default_value_t = 1 << 16)]
    heap_words: usize,

    /// Granularity of chunk sizes in words (a power of two)
    #[arg(long, default_value_t = FreeListConfig::DEFAULT_CHUNK_SIZE_ALIGNMENT)]
    alignment: usize,

    /// Verify the free list after the last step
    #[arg(long)]
    verify: bool,

    /// Print the free list after the last step
    #[arg(long)]
    dump: bool,

    /// Increase logging verbosity (overrides `RUST_LOG`)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to read trace file `{}`", path.display()))]
    #[snafu(provide(ref, priority, Location => location))]
    ReadTrace {
        path: PathBuf,
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: std::io::Error,
    },
    #[snafu(display("failed to parse trace file `{}`", path.display()))]
    #[snafu(provide(ref, priority, Location => location))]
    ParseTrace {
        path: PathBuf,
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: trace::TraceError,
    },
    #[snafu(display("simulation failed"))]
    #[snafu(provide(ref, priority, Location => location))]
    Simulate {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        source: SimError,
    },
}

fn init_logger(verbose: u8) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Info);
        }
        2 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let text = fs::read_to_string(&cli.trace).context(ReadTraceSnafu { path: &cli.trace })?;
    let steps = trace::parse(&text).context(ParseTraceSnafu { path: &cli.trace })?;
    info!("replaying {} steps from {}", steps.len(), cli.trace.display());

    let mut sim = Simulator::new(cli.heap_words, FreeListConfig::new(cli.alignment))
        .context(SimulateSnafu)?;
    sim.run(&steps).context(SimulateSnafu)?;
    if cli.verify {
        let last_line = steps.last().map_or(0, |step| step.line);
        sim.verify(last_line).context(SimulateSnafu)?;
    }
    if cli.dump {
        print!("{}", sim.list());
    }
    print!("{}", sim.summary());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = run(&cli) {
        eprint!("{}", Report::new(err));
        process::exit(1);
    }
}
