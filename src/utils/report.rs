use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, NaiveDate};
use colored::Colorize;
use eyre::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::models::job::{ApplicationResult, Outcome};
use crate::sites::SiteKind;

const REPORT_PREFIX: &str = "applications_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteReport {
    pub site: SiteKind,
    pub jobs_found: usize,
    pub applied: usize,
    pub manual: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub duration_secs: f64,
    pub results: Vec<ApplicationResult>,
}

impl SiteReport {
    fn new(site: SiteKind) -> Self {
        Self {
            site,
            jobs_found: 0,
            applied: 0,
            manual: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
            duration_secs: 0.0,
            results: Vec::new(),
        }
    }

    fn record(&mut self, result: ApplicationResult) {
        match result.outcome {
            _ if result.counted => self.applied += 1,
            Outcome::CompletedByHuman => self.manual += 1,
            Outcome::Skipped => self.skipped += 1,
            _ => self.failed += 1,
        }
        self.results.push(result);
    }

    /// Applied over attempted, skips excluded. 0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.applied + self.manual + self.failed;
        if attempted == 0 {
            0.0
        } else {
            (self.applied + self.manual) as f64 / attempted as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub interrupted: bool,
    pub sites: Vec<SiteReport>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            finished_at: None,
            interrupted: false,
            sites: Vec::new(),
        }
    }

    pub fn applied(&self) -> usize {
        self.sites.iter().map(|s| s.applied).sum()
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}{}.json",
            REPORT_PREFIX,
            self.started_at.format("%Y%m%d_%H%M%S")
        )
    }

    fn site_mut(&mut self, site: SiteKind) -> &mut SiteReport {
        let idx = match self.sites.iter().position(|s| s.site == site) {
            Some(idx) => idx,
            None => {
                self.sites.push(SiteReport::new(site));
                self.sites.len() - 1
            }
        };
        &mut self.sites[idx]
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, append-only view of the run. Every result lands here as soon as
/// it is known so an interrupted run still has something to write.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<RunReport>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunReport> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin_site(&self, site: SiteKind) {
        self.lock().site_mut(site);
    }

    pub fn found(&self, site: SiteKind, jobs: usize) {
        self.lock().site_mut(site).jobs_found += jobs;
    }

    pub fn record(&self, site: SiteKind, result: ApplicationResult) {
        self.lock().site_mut(site).record(result);
    }

    pub fn error(&self, site: SiteKind, error: impl Into<String>) {
        self.lock().site_mut(site).errors.push(error.into());
    }

    pub fn finish_site(&self, site: SiteKind, duration_secs: f64) {
        self.lock().site_mut(site).duration_secs = duration_secs;
    }

    pub fn applied(&self) -> usize {
        self.lock().applied()
    }

    pub fn site_applied(&self, site: SiteKind) -> usize {
        self.lock()
            .sites
            .iter()
            .find(|s| s.site == site)
            .map_or(0, |s| s.applied)
    }

    /// Stamps the end time and hands back a copy for writing.
    pub fn finish(&self, interrupted: bool) -> RunReport {
        let mut report = self.lock();
        report.finished_at = Some(Local::now());
        report.interrupted = interrupted;
        report.clone()
    }
}

pub fn write_report(dir: &Path, report: &RunReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report.file_name());
    fs::write(&path, serde_json::to_string_pretty(report)?)?;
    info!("run report written to {}", path.display());
    Ok(path)
}

/// Applications already counted on `day` by earlier runs, read back from
/// their reports. Unreadable files are ignored.
pub fn applied_on(dir: &Path, day: NaiveDate) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(REPORT_PREFIX) && n.ends_with(".json"))
        })
        .filter_map(|path| {
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<RunReport>(&raw).ok());
            if parsed.is_none() {
                debug!("ignoring unreadable report {}", path.display());
            }
            parsed
        })
        .filter(|report| report.started_at.date_naive() == day)
        .map(|report| report.applied())
        .sum()
}

pub fn print_summary(report: &RunReport) {
    println!("\n{}", "=== Run Summary ===".cyan().bold());
    if report.interrupted {
        println!("{}", "run interrupted by operator".yellow());
    }

    for site in &report.sites {
        println!(
            "{} found {}, applied {}, manual {}, skipped {}, failed {} ({:.1}% success, {:.1} min)",
            site.site.to_string().to_uppercase().bold(),
            site.jobs_found,
            site.applied.to_string().green(),
            site.manual,
            site.skipped.to_string().yellow(),
            site.failed.to_string().red(),
            site.success_rate(),
            site.duration_secs / 60.0
        );
        for error in &site.errors {
            println!("   {} {}", "✗".red(), error);
        }
    }

    println!(
        "{} {}",
        "total applications:".bold(),
        report.applied().to_string().green().bold()
    );
}
