mod browser;
mod chat;
mod flow;
mod gate;
mod models;
mod sites;
mod utils;

use std::time::Duration;

use chrono::Local;
use clap::Parser;
use colored::Colorize;
use eyre::Result;
use log::{info, warn};

use crate::browser::locator::ElementLocator;
use crate::browser::session::SessionDriver;
use crate::chat::analyzer::JobAnalyzer;
use crate::flow::runner::run_until;
use crate::flow::{Automation, Budget};
use crate::gate::{InterventionGate, default_indicators, prompt};
use crate::utils::cli::Args;
use crate::utils::config::{ConfigInner, config};
use crate::utils::log::Logger;
use crate::utils::report::{Recorder, applied_on, print_summary};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    Logger::init(args.verbosity);

    info!(
        "starting auto-apply {}",
        format!("v{}", env!("CARGO_PKG_VERSION")).magenta()
    );

    let mut config: ConfigInner = (*config(args.config.clone())?).clone();
    apply_overrides(&mut config, &args);

    let earlier_today = applied_on(&config.output.dir, Local::now().date_naive());
    if earlier_today >= config.limits.max_applications_per_day {
        warn!(
            "daily limit of {} applications already reached",
            config.limits.max_applications_per_day
        );
        return Ok(());
    }
    if earlier_today > 0 {
        info!("{} applications already made today", earlier_today);
    }

    let analyzer = JobAnalyzer::connect(&config.analyzer).await;
    let mut indicators = default_indicators();
    indicators.extend(config.intervention.extra_indicators.iter().cloned());
    let gate = InterventionGate::new(
        indicators,
        prompt::build(config.intervention.mode),
        config.intervention.timeout_secs.map(Duration::from_secs),
    );

    let session = SessionDriver::start(&config.browser).await?;

    let mut automation = Automation {
        browser: &session,
        config: &config,
        locator: ElementLocator::default(),
        gate,
        analyzer,
        recorder: Recorder::new(),
        budget: Budget {
            per_site: config.limits.max_applications_per_site,
            per_day: config.limits.max_applications_per_day,
            earlier_today,
        },
    };

    let shutdown = async {
        // without a signal handler the run can only end on its own
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let report = run_until(&mut automation, &args.site, shutdown).await;
    print_summary(&report);

    if report.interrupted {
        // a terminal prompt may still be waiting on stdin
        std::process::exit(130);
    }
    Ok(())
}

fn apply_overrides(config: &mut ConfigInner, args: &Args) {
    if let Some(mode) = args.gate {
        config.intervention.mode = mode;
    }
    if let Some(max) = args.max_applications {
        config.limits.max_applications_per_site = max;
    }
    if let Some(dir) = &args.output {
        config.output.dir = dir.clone();
    }
}
