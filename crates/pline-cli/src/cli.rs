use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pline", version, about = "run several programs in parallel")]
pub struct Cli {
    /// Script to run; repeatable, `-` means standard input
    #[arg(short = 'i', long = "input", value_name = "FILENAME")]
    pub inputs: Vec<String>,

    /// Max processes to run at once
    #[arg(short = 'n', long = "max-parallel", value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Mode of operation
    #[arg(short = 'm', long = "mode", value_name = "MODE", default_value = "default")]
    pub mode: String,

    /// List all modes of operation
    #[arg(long = "list-modes")]
    pub list_modes: bool,

    /// Tee diagnostics to FILENAME in addition to stderr
    #[arg(short = 'l', long = "log", value_name = "FILENAME")]
    pub log: Option<PathBuf>,
}
