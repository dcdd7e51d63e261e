use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::gate::GateMode;
use crate::sites::SiteKind;

#[derive(Parser, Debug)]
#[command(name = "auto-apply")]
#[command(
    about = "Search job boards and walk Easy Apply flows with a human in the loop",
    long_about = None
)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Only run the given site(s); may be repeated
    #[arg(short, long, value_name = "SITE")]
    pub site: Vec<SiteKind>,

    /// How to ask the operator for help: auto, dialog, terminal or deny
    #[arg(short, long, value_name = "MODE")]
    pub gate: Option<GateMode>,

    /// Overrides limits.max_applications_per_site
    #[arg(short, long, value_name = "N")]
    pub max_applications: Option<usize>,

    /// Directory for the JSON run report (overrides output.dir)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Sets the logger's verbosity level
    #[arg(short, long, value_name = "VERBOSITY", default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,
}
