//! One audit run: fetch every host, classify what was found, keep the cache in
//! step with it.
//!
//! The run is all-or-nothing. Host results are aggregated first and the first
//! failed host aborts the run before anything is printed or written to the
//! cache.

use crate::Result;
use crate::cache::{self, STALE_AFTER, StalenessCache, Status};
use crate::config::Config;
use crate::fetch::{HostError, HostFetcher, HostPaths, Transport};
use crate::pool::WorkerPool;
use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;
use std::time::SystemTime;

pub const DEFAULT_CACHE_PATH: &str = "database.db";

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Print every classification plus removals. Implies `store`.
    pub verbose: bool,
    /// Track first-seen times and report only stale identifiers.
    pub store: bool,
    pub cache_path: PathBuf,
}

impl RunOptions {
    pub fn caching(&self) -> bool {
        self.store || self.verbose
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            store: false,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
        }
    }
}

/// Everything a run needs, built once by the caller.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Config,
    pub options: RunOptions,
    pub now: SystemTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub hosts: usize,
    pub observed: usize,
    pub new: usize,
    pub fresh: usize,
    pub stale: usize,
    pub removed: usize,
}

/// Collect per-host results. The first failure wins and the rest is dropped.
pub fn aggregate<I>(results: I) -> std::result::Result<Vec<HostPaths>, HostError>
where
    I: IntoIterator<Item = std::result::Result<HostPaths, HostError>>,
{
    results.into_iter().collect()
}

/// Cache changes and report lines for one run, computed without side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Observed, non-whitelisted identifiers in arrival order, each once.
    pub findings: Vec<(String, Status)>,
    /// Identifiers to store with the current time.
    pub record: Vec<String>,
    /// Cached identifiers not observed in this run.
    pub remove: Vec<String>,
    /// The part of `remove` that may be shown; whitelisted entries are left out.
    pub report_removed: Vec<String>,
}

pub fn plan(
    observed: &[HostPaths],
    whitelist: &BTreeSet<String>,
    snapshot: &BTreeMap<String, u64>,
    now: u64,
) -> Plan {
    let mut out = Plan::default();
    let mut touched: BTreeSet<&str> = BTreeSet::new();

    for id in observed.iter().flat_map(|h| h.ids.iter()) {
        if whitelist.contains(id) || !touched.insert(id.as_str()) {
            continue;
        }
        let status = cache::classify(snapshot.get(id).copied(), now);
        if status == Status::New {
            out.record.push(id.clone());
        }
        out.findings.push((id.clone(), status));
    }

    out.remove = snapshot
        .keys()
        .filter(|id| !touched.contains(id.as_str()))
        .cloned()
        .collect();
    out.report_removed = out
        .remove
        .iter()
        .filter(|id| !whitelist.contains(*id))
        .cloned()
        .collect();
    out
}

/// Report lines for a cached run.
pub fn render(plan: &Plan, verbose: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for (id, status) in &plan.findings {
        match (status, verbose) {
            (Status::Stale(age), true) => lines.push(format!(
                "STALE: {} diff: {}",
                id,
                humantime::format_duration(*age)
            )),
            (Status::Stale(_), false) => lines.push(id.clone()),
            (Status::Fresh(age), true) => lines.push(format!(
                "fresh: {} diff: {}",
                id,
                humantime::format_duration(*age)
            )),
            (Status::New, true) => lines.push(format!("new:   {}", id)),
            (Status::Fresh(_) | Status::New, false) => {}
        }
    }
    if verbose {
        for id in &plan.report_removed {
            lines.push(format!("rem:   {}", id));
        }
    }
    lines
}

/// Execute one run against `transport`, writing the report to `out`.
pub fn execute<T: Transport>(
    ctx: &RunContext,
    transport: T,
    out: &mut impl Write,
) -> Result<RunSummary> {
    let config = &ctx.config;
    let now = cache::unix_seconds(ctx.now);
    let whitelist = config.whitelist_set();

    // Opened before any host is contacted; dropped on every exit path.
    let cache = if ctx.options.caching() {
        Some(StalenessCache::open(&ctx.options.cache_path)?)
    } else {
        None
    };
    let snapshot = match &cache {
        Some(cache) => cache.load_all()?,
        None => BTreeMap::new(),
    };

    let fetcher = HostFetcher::new(transport, config.ssh_client.credentials()?);
    let pool = WorkerPool::new(config.ssh_client.num_workers);
    tracing::info!(
        hosts = config.ssh_hosts.len(),
        workers = pool.size(),
        "fetching configurations"
    );
    let observed = pool.run(
        config.ssh_hosts.clone(),
        |host| fetcher.fetch(host),
        |results| aggregate(results),
    )??;

    for host in &observed {
        tracing::debug!(host = %host.host, found = host.ids.len(), "host done");
    }

    let mut summary = RunSummary {
        hosts: observed.len(),
        ..RunSummary::default()
    };

    let Some(cache) = cache else {
        for id in observed.iter().flat_map(|h| h.ids.iter()) {
            if whitelist.contains(id) {
                continue;
            }
            writeln!(out, "{}", id)?;
            summary.observed += 1;
        }
        log_summary(&summary);
        return Ok(summary);
    };

    let plan = plan(&observed, &whitelist, &snapshot, now);
    for id in &plan.record {
        cache
            .record_seen(id, now)
            .with_context(|| format!("record {} in cache", id))?;
    }
    for id in &plan.remove {
        cache
            .remove(id)
            .with_context(|| format!("remove {} from cache", id))?;
    }

    for line in render(&plan, ctx.options.verbose) {
        writeln!(out, "{}", line)?;
    }

    summary.observed = plan.findings.len();
    summary.removed = plan.remove.len();
    for (_, status) in &plan.findings {
        match status {
            Status::New => summary.new += 1,
            Status::Fresh(_) => summary.fresh += 1,
            Status::Stale(_) => summary.stale += 1,
        }
    }
    log_summary(&summary);
    Ok(summary)
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        hosts = summary.hosts,
        observed = summary.observed,
        new = summary.new,
        fresh = summary.fresh,
        stale = summary.stale,
        removed = summary.removed,
        stale_after = %humantime::format_duration(STALE_AFTER),
        "run finished"
    );
}
