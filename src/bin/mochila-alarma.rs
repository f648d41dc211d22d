use clap::Parser;
use log::{error, info, LevelFilter};
use mochila_alarma::{init_logging, run};
use mochila_alarma::cli::types::Args;
use mochila_alarma::error::AppRunError;

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();
    init_logging(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    info!(concat!("Mochila-Alarma ", env!("CARGO_PKG_VERSION")));

    match run(args) {
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        }
        Ok(_) => Ok(())
    }
}
