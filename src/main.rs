use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use chrono::{Local, Utc};
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap_complete::Shell;
use indicatif::{ProgressBar, ProgressStyle};
use is_terminal::IsTerminal;
use serde::Serialize;
mod config;
mod disks;
mod event_xml;
mod events;
mod host;
mod html;
mod opener;
mod services;
#[cfg(target_os = "windows")]
mod windows_live;

use crate::config::HealthConfig;
use crate::disks::DiskRecord;
use crate::events::EventScan;
use crate::host::HostQuery;
use crate::html::ReportContext;
use crate::opener::{DefaultOpener, NoOpen, Opener};
use crate::services::ServiceRecord;

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat { Text, Json }

#[derive(Parser, Debug, Default)]
#[command(
    name = "HealthSnap",
    about = "Windows host health snapshot",
    long_about = "Samples disk capacity, critical service state and the last day of System/Application errors and warnings, then writes a timestamped HTML report to the desktop and opens it.",
    after_long_help = "Examples:\n  HealthSnap\n  HealthSnap --no-open --output-dir C:\\Reports\n  HealthSnap --config HealthSnap.toml --json-path snapshot.json",
    color = ColorChoice::Auto
)]
struct Args {
    /// TOML config file (default ./HealthSnap.toml when present)
    #[arg(long)]
    config: Option<String>,
    /// Directory for the report (default: the user's desktop)
    #[arg(long, short = 'o')]
    output_dir: Option<String>,
    #[arg(long, default_value_t = false)]
    no_open: bool,
    /// Also write the collected data as JSON
    #[arg(long, short = 'j')]
    json_path: Option<String>,
    #[arg(long, default_value_t = false)]
    progress: bool,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

/// Everything collected in one run, as exported by `--json-path`.
#[derive(Serialize)]
struct Snapshot<'a> {
    machine: &'a str,
    generated_at: String,
    disks: &'a [DiskRecord],
    services: &'a [ServiceRecord],
    events: &'a EventScan,
}

fn main() {
    let args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        clap_complete::generate(sh, &mut cmd, "HealthSnap", &mut std::io::stdout());
        return;
    }
    init_logging(&args);
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let _ = ENABLE_COLOR.set(color_default && !args.no_color);

    let cfg = resolve_config(&args, config::load_file_config(args.config.as_deref()));
    let output_dir = resolve_output_dir(&cfg, dirs::desktop_dir(), dirs::home_dir());
    let opener: Box<dyn Opener> = if cfg.no_open { Box::new(NoOpen) } else { Box::new(DefaultOpener) };
    let host = host::WindowsHost::new();
    let machine = host::machine_name();
    match run(&host, &cfg, &machine, output_dir, opener.as_ref(), args.progress, args.json_path.as_deref().map(Path::new)) {
        Ok(path) => {
            if !args.quiet { println!("{}", paint(&format!("Report generated: {}", path.to_string_lossy()), "1;36")); }
        }
        Err(e) => {
            eprintln!("{} {:#}", paint("error:", "1;31"), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    match args.log_format {
        Some(LogFormat::Json) => {
            builder.format(|buf, record| {
                use std::io::Write;
                let obj = serde_json::json!({
                    "ts": Local::now().to_rfc3339(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", obj)
            });
        }
        Some(LogFormat::Text) => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(buf, "[{:<5} {}] {}", record.level(), Local::now().format("%H:%M:%S"), record.args())
            });
        }
        None => {}
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => eprintln!("Failed to open log file {}: {}", path, e),
        }
    }
    builder.init();
}

/// Defaults, then the config file, then command-line flags.
fn resolve_config(args: &Args, file: Option<config::FileConfig>) -> HealthConfig {
    let mut cfg = HealthConfig::default();
    if let Some(fc) = file { cfg.apply_file(fc); }
    if let Some(d) = args.output_dir.as_ref() { cfg.output_dir = Some(PathBuf::from(d)); }
    if args.no_open { cfg.no_open = true; }
    cfg
}

/// Configured directory, else the OS desktop folder, else `<home>/Desktop`, else the working directory.
fn resolve_output_dir(cfg: &HealthConfig, desktop: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if let Some(d) = cfg.output_dir.as_ref() { return d.clone(); }
    if let Some(d) = desktop { return d; }
    match home {
        Some(h) => h.join("Desktop"),
        None => {
            log::warn!("Home directory unknown; writing the report to the current directory");
            PathBuf::from(".")
        }
    }
}

/// Runs the three checks in order and writes the report. Only report-writing failures are errors.
fn run(host: &dyn HostQuery, cfg: &HealthConfig, machine: &str, output_dir: PathBuf, opener: &dyn Opener, progress: bool, json_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    println!("{}", paint(&format!("System health check for {}", machine), "1;36"));
    let bar = if progress {
        let pb = ProgressBar::new(3);
        pb.set_style(ProgressStyle::with_template("[{pos}/{len}] {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));
        Some(pb)
    } else { None };
    let stage = |n: u64, msg: &str| match bar.as_ref() {
        Some(pb) => { pb.set_position(n - 1); pb.set_message(msg.to_string()); }
        None => println!("\n{}", paint(&format!("[{}/3] {}", n, msg), "1")),
    };

    stage(1, "Checking disk space...");
    let disks = above_bar(bar.as_ref(), || disks::collect_disks(host));
    stage(2, "Checking critical services...");
    let services = above_bar(bar.as_ref(), || services::collect_services(host, &cfg.services));
    stage(3, "Checking event logs...");
    let events = above_bar(bar.as_ref(), || events::collect_events(host, &cfg.channels, cfg.window, cfg.max_events, Utc::now()));
    if let Some(pb) = bar { pb.finish_and_clear(); }

    let ctx = ReportContext { machine_name: machine.to_string(), output_dir, generated_at: Local::now(), window_hours: cfg.window_hours() };
    if let Some(p) = json_path {
        let snap = Snapshot { machine, generated_at: ctx.generated_at.to_rfc3339(), disks: &disks, services: &services, events: &events };
        match serde_json::to_string_pretty(&snap).map_err(anyhow::Error::from).and_then(|s| std::fs::write(p, s).map_err(anyhow::Error::from)) {
            Ok(()) => log::info!("Snapshot written to {}", p.to_string_lossy()),
            Err(e) => log::error!("JSON write failed for {}: {}", p.to_string_lossy(), e),
        }
    }
    html::generate_report(&disks, &services, &events, &ctx, opener)
}

/// Runs `f` with the progress bar hidden so table output is not drawn over it.
fn above_bar<T>(bar: Option<&ProgressBar>, f: impl FnOnce() -> T) -> T {
    match bar { Some(pb) => pb.suspend(f), None => f() }
}

fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use chrono::Duration;
    use crate::config::FileConfig;
    use crate::host::RawVolume;
    use crate::host::fake::{FakeHost, svc};

    fn only_report(dir: &Path) -> String {
        let files: Vec<PathBuf> = std::fs::read_dir(dir).unwrap().flatten().map(|e| e.path()).collect();
        assert_eq!(files.len(), 1);
        std::fs::read_to_string(&files[0]).unwrap()
    }

    #[test]
    fn flags_override_config_file() {
        let args = Args { output_dir: Some("D:/out".to_string()), no_open: true, ..Default::default() };
        let file = FileConfig { output_dir: Some("C:/cfg".to_string()), no_open: Some(false), max_events: Some(5), ..Default::default() };
        let cfg = resolve_config(&args, Some(file));
        assert_eq!(cfg.output_dir, Some(PathBuf::from("D:/out")));
        assert!(cfg.no_open);
        assert_eq!(cfg.max_events, 5);
    }

    #[test]
    fn output_dir_prefers_the_os_desktop_folder() {
        let cfg = HealthConfig::default();
        let redirected = PathBuf::from("OneDrive").join("Desktop");
        assert_eq!(resolve_output_dir(&cfg, Some(redirected.clone()), Some(PathBuf::from("home"))), redirected);
        assert_eq!(resolve_output_dir(&cfg, None, Some(PathBuf::from("home"))), PathBuf::from("home").join("Desktop"));
        assert_eq!(resolve_output_dir(&cfg, None, None), PathBuf::from("."));
        let cfg = HealthConfig { output_dir: Some(PathBuf::from("elsewhere")), ..Default::default() };
        assert_eq!(resolve_output_dir(&cfg, Some(redirected), Some(PathBuf::from("home"))), PathBuf::from("elsewhere"));
    }

    #[test]
    fn stage_output_runs_with_or_without_a_bar() {
        let pb = ProgressBar::hidden();
        pb.set_position(1);
        assert_eq!(above_bar(Some(&pb), || 7), 7);
        assert_eq!(pb.position(), 1);
        assert_eq!(above_bar(None, || "plain"), "plain");
    }

    #[test]
    fn report_is_written_when_every_check_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("Desktop");
        let path = run(&FakeHost::default(), &HealthConfig::default(), "WS-01", dir.clone(), &NoOpen, false, None).unwrap();
        assert!(path.starts_with(&dir));
        let html = only_report(&dir);
        assert!(html.contains(crate::html::EVENTS_UNAVAILABLE_NOTICE));
        assert!(html.contains("<tbody></tbody>"));
    }

    #[test]
    fn full_run_renders_collected_data_and_snapshot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();
        let now = Utc::now();
        let host = FakeHost {
            volumes: Some(vec![RawVolume { drive: "C:".to_string(), size_bytes: 500 << 30, free_bytes: 100 << 30 }]),
            services: Some(HashMap::from([("Spooler".to_string(), svc("Spooler", "Stopped", "Auto"))])),
            events: Some(HashMap::from([("System".to_string(), vec![crate::events::sample_event(now - Duration::minutes(5), 7, crate::events::Severity::Error)])])),
        };
        let json = dir.join("snapshot.json");
        let path = run(&host, &HealthConfig::default(), "WS-01", dir.join("reports"), &NoOpen, true, Some(&json)).unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("<td>80%</td>"));
        assert!(html.contains("class=\"status-bad\">Stopped"));
        assert!(html.contains("<td>7</td>"));
        let snap: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(snap["machine"], "WS-01");
        assert_eq!(snap["disks"][0]["used_percent"], 80);
        assert_eq!(snap["events"]["status"], "entries");
    }

    #[test]
    fn unwritable_destination_fails_the_run() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        assert!(run(&FakeHost::default(), &HealthConfig::default(), "WS-01", blocker.join("sub"), &NoOpen, false, None).is_err());
    }

    #[test]
    fn truncate_handles_multibyte() {
        let t = truncate("你好世界", 2);
        assert_eq!(t, "你好...");
        assert_eq!(truncate("abcdef", 6), "abcdef");
    }
}
