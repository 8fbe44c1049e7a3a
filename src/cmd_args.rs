use clap::Parser;
use clap_complete::Shell;

/// run the FIR accelerator model with the given config files
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// extra config files (or glob patterns) merged on top of configs/default.toml
    pub config_names: Vec<String>,
    /// print the completion script for the given shell and exit
    #[clap(long = "generate", arg_enum)]
    pub generator: Option<Shell>,
}
