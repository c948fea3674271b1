use clap::{Parser, Subcommand, ValueEnum};
use dc_core::DceVersion;
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Asic {
    #[value(name = "dce110")]
    Dce110,
    #[value(name = "dce112")]
    Dce112,
    #[value(name = "dcn10")]
    Dcn10,
}

impl Asic {
    pub fn version(self) -> DceVersion {
        match self {
            Self::Dce110 => DceVersion::Dce110,
            Self::Dce112 => DceVersion::Dce112,
            Self::Dcn10 => DceVersion::Dcn10,
        }
    }
}

#[derive(Parser)]
#[command(name = "dcsim")]
#[command(about = "Run display core scenarios against simulated hardware")]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Cli {
    pub fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Execute a scenario file step by step and report what the hardware saw.
    Run {
        scenario: PathBuf,

        #[arg(
            long = "asic",
            value_enum,
            help = "Run on this ASIC instead of the one named in the scenario."
        )]
        asic: Option<Asic>,

        #[arg(
            long = "histogram",
            help = "Print how often each block operation was written."
        )]
        histogram: bool,
    },

    /// List the timings a scenario may name as `WxH@R`.
    ListModes,
}
