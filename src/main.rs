use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;

mod cache;
mod config;
mod diagnostics;
mod fetch;
mod pool;
mod run;
mod xml;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser, Debug)]
#[command(name = "inactive-audit")]
#[command(about = "Report inactive configuration on network devices", long_about = None)]
struct Cli {
    /// Show new, fresh and removed entries and worker progress (implies -s).
    #[arg(short = 'v')]
    verbose: bool,

    /// Use the cache to report only entries inactive for more than 30 days.
    #[arg(short = 's')]
    store: bool,

    #[arg(short = 'c', long, default_value = "config.yml")]
    config: PathBuf,

    /// Cache database file.
    #[arg(long, default_value = run::DEFAULT_CACHE_PATH)]
    cache: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    diagnostics::init_logging(cli.verbose);

    match audit(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn audit(cli: Cli) -> Result<()> {
    // 1) Load config.
    let config = config::Config::load(&cli.config)?;
    let transport = fetch::SshTransport::new(config.ssh_client.port);

    // 2) Run against the fleet; the report goes to stdout.
    let ctx = run::RunContext {
        config,
        options: run::RunOptions {
            verbose: cli.verbose,
            store: cli.store,
            cache_path: cli.cache,
        },
        now: SystemTime::now(),
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run::execute(&ctx, transport, &mut out)?;
    out.flush()?;

    Ok(())
}
