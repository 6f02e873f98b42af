use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct ArgsParser {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// start polling the sensor and serving the HTTP API
    Run {
        #[command(flatten)]
        args: RunArgs,
    },
    /// kill the currently running sensord daemon (if there is one)
    Kill {
        #[arg(long, short, help = "path to the TOML config file")]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, short, help = "path to the TOML config file")]
    pub config: PathBuf,
    #[arg(
        long,
        help = "fork into the background after startup; stop it again with `sensord kill`"
    )]
    pub daemonize: bool,
    #[arg(
        long,
        help = "skip the PID file check and do not write one (cannot be used with --daemonize)"
    )]
    pub no_safeguards: bool,
}
