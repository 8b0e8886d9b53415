use clap::Parser;
use ferry_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // Logging comes up before any config or network work.
    logging::init(cli.verbose);

    let code = match cli.run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ferry error: {:#}", err);
            1
        }
    };
    std::process::exit(code);
}
