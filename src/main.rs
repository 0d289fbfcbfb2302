use clap::Parser;
use stratforge::cli::{Cli, run};
use stratforge::logging::init_logging;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}
