use anyhow::Result;
use hoistpm::cli::HoistCli;

fn main() {
    if let Err(e) = real_main() {
        eprintln!("hoistpm error: {:#}", e);
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let cli = HoistCli::parse();
    hoistpm::logging::init(cli.verbosity());
    cli.run()
}
