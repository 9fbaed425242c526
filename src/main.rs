mod args;
mod ranker;

use clap::Parser;
use log::{debug, warn};

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    debug!("args: {:?}", args);

    let res = ranker::run_session(
        &args.config,
        args.reference.as_deref(),
        args.out.as_deref(),
        args.count,
        args.method.as_deref(),
    );
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured: {}", e);
        std::process::exit(1);
    }
}
