//! TaskRig runner.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Adapters     SystemClock / SimClock   LogHost / DataFile │
//! │               (Clock)                  (HostPort)         │
//! │  ────────────────── Port Trait Boundary ────────────────  │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │ Framework: tasks · timers · event queue · output    │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │  SetupStore (hardware variables) · PersistentVariables    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! On a host the bundled blink task runs either in real time or, with
//! `--sim`, on virtual time as fast as the CPU allows.  On the device the
//! same task runs against the ESP timer and the console logger.  With
//! `--subject` a host run also appends its telemetry to that subject's
//! data file.
#![deny(unused_must_use)]

use anyhow::Result;
use log::info;

use taskrig::events::EventInbox;
use taskrig::scheduler::RunReport;
#[cfg(target_os = "espidf")]
use taskrig::{
    adapters::{LogHost, SystemClock},
    scheduler::Framework,
    tasks::blink::{self, Blink},
};

/// Interrupt inbox shared with GPIO handlers.
static INBOX: EventInbox = EventInbox::new();

// ── Host runner ───────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod host {
    use std::path::PathBuf;

    use anyhow::{bail, Context, Result};
    use clap::Parser;
    use log::info;

    use taskrig::adapters::{DataFile, LogHost, SimClock, SystemClock};
    use taskrig::app::ports::HostPort;
    use taskrig::config::FrameworkConfig;
    use taskrig::events::Millis;
    use taskrig::persist::PersistentVariables;
    use taskrig::scheduler::{Framework, RunReport};
    use taskrig::setup::SetupStore;
    use taskrig::tasks::blink::{self, Blink};
    use taskrig::variables::parse_value;

    /// Run the bundled blink task
    #[derive(Parser, Debug)]
    #[command(name = "taskrig")]
    #[command(about = "Run a state-machine task on virtual or wall-clock time", long_about = None)]
    #[command(version)]
    pub struct Args {
        /// Run length in milliseconds (default: until the task stops)
        #[arg(short, long, value_name = "MS")]
        duration: Option<Millis>,

        /// Use virtual time instead of the wall clock
        #[arg(long)]
        sim: bool,

        /// Set a task variable before the run (NAME=VALUE, repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        assignments: Vec<String>,

        /// Framework configuration (JSON)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Hardware setup store (JSON)
        #[arg(long, value_name = "FILE")]
        setup: Option<PathBuf>,

        /// Address of the setup to use from the store
        #[arg(long, value_name = "ADDRESS", requires = "setup")]
        address: Option<String>,

        /// Persistent variable file (JSON)
        #[arg(long, value_name = "FILE", requires = "subject")]
        persist: Option<PathBuf>,

        /// Subject of the session: selects the data file and persistent
        /// variables
        #[arg(long, value_name = "SUBJECT")]
        subject: Option<String>,

        /// Directory for per-subject data files
        #[arg(long, value_name = "DIR", default_value = "data")]
        data_dir: PathBuf,

        /// Variables to carry between sessions (repeatable)
        #[arg(long = "persistent", value_name = "NAME")]
        persistent: Vec<String>,

        /// Verbosity level (can be repeated: -v, -vv)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,
    }

    pub fn main() -> Result<()> {
        let args = Args::parse();
        init_logging(args.verbose);
        info!("TaskRig v{}", env!("CARGO_PKG_VERSION"));

        let config = match &args.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str::<FrameworkConfig>(&text)
                    .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?
            }
            None => FrameworkConfig::default(),
        };

        let mut fw = Framework::new(config, &super::INBOX)?;
        fw.register(blink::definition(), Blink::default())?;

        for assignment in &args.assignments {
            let Some((name, text)) = assignment.split_once('=') else {
                bail!("expected NAME=VALUE, got '{}'", assignment);
            };
            fw.set_variable(name.trim(), parse_value(text).into_value())?;
        }

        if let Some(path) = &args.setup {
            let store = SetupStore::load(path)?;
            let address = args
                .address
                .as_deref()
                .context("--address is required with --setup")?;
            store.apply(address, &mut fw)?;
        }

        let persistent: Vec<&str> = args.persistent.iter().map(String::as_str).collect();
        let mut stored = match (&args.persist, &args.subject) {
            (Some(path), Some(subject)) => {
                let pv = PersistentVariables::load(path)?;
                pv.restore(&mut fw, subject, &persistent)?;
                Some(pv)
            }
            _ => None,
        };

        let report = match &args.subject {
            Some(subject) => {
                let mut host = DataFile::open(&args.data_dir, subject, blink::NAME, fw.ids())
                    .with_context(|| format!("opening data file in {}", args.data_dir.display()))?;
                let report = run_with(&mut fw, &mut host, &args)?;
                info!("Data: {} records written to {}", host.written(), host.path().display());
                report
            }
            None => {
                let mut host = LogHost::new(fw.ids());
                run_with(&mut fw, &mut host, &args)?
            }
        };
        super::summarise(&report);

        if let (Some(pv), Some(subject)) = (stored.as_mut(), &args.subject) {
            pv.capture(&fw, subject, &persistent)?;
            pv.save()?;
        }

        match report.fault {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    fn run_with<H: HostPort>(fw: &mut Framework<'_>, host: &mut H, args: &Args) -> Result<RunReport> {
        let report = if args.sim {
            fw.run(&mut SimClock::new(), host, args.duration)?
        } else {
            let mut clock = SystemClock::new(fw.config().idle_poll_ms);
            fw.run(&mut clock, host, args.duration)?
        };
        Ok(report)
    }

    fn init_logging(verbose: u8) {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    }
}

fn summarise(report: &RunReport) {
    info!(
        "Run finished at t={} ms: {} events, {} output records dropped",
        report.end_time, report.events_processed, report.output_dropped
    );
    if let Some(fault) = &report.fault {
        log::error!("Run ended by fault: {}", fault);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> Result<()> {
    host::main()
}

// ── Device runner ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  TaskRig v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let mut fw = Framework::new(taskrig::config::FrameworkConfig::default(), &INBOX)?;
    fw.register(blink::definition(), Blink::default())?;
    let mut host = LogHost::new(fw.ids());
    let mut clock = SystemClock::new(fw.config().idle_poll_ms);

    loop {
        let report = fw.run(&mut clock, &mut host, None)?;
        summarise(&report);
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(5_000);
    }
}
