use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

pub mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "hoistpm",
    version,
    about = "npm-compatible installer with a hoisted, deduplicated node_modules tree",
    long_about = "hoistpm resolves packages from an npm registry, deduplicates them into a nested node_modules tree and installs the verified archives.\n\nExamples:\n  hoistpm install\n  hoistpm install left-pad@^1.3.0 @types/node@latest"
)]
pub struct HoistCli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the manifest's dependencies, or the given name@constraint specs
    #[command(alias = "i")]
    Install {
        /// Packages to install (name[@constraint]); none means package.json
        packages: Vec<String>,
    },
}

impl HoistCli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn run(&self) -> Result<()> {
        match &self.command {
            None => {
                self.print_help();
                Ok(())
            }
            Some(Commands::Install { packages }) => commands::cmd_install(packages),
        }
    }

    fn print_help(&self) {
        println!("hoistpm - hoisting npm package installer\n");
        println!("Commands:\n  install [name@constraint..]");
    }
}
