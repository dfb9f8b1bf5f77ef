use std::fmt;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use crate::host::{HostQuery, RawService};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RunState { Running, Stopped, StartPending, StopPending, ContinuePending, PausePending, Paused, Other(String) }

impl RunState {
    pub fn parse(s: &str) -> Self {
        let k: String = s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_lowercase();
        match k.as_str() {
            "running" => RunState::Running,
            "stopped" => RunState::Stopped,
            "startpending" => RunState::StartPending,
            "stoppending" => RunState::StopPending,
            "continuepending" => RunState::ContinuePending,
            "pausepending" => RunState::PausePending,
            "paused" => RunState::Paused,
            _ => RunState::Other(s.trim().to_string()),
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &str = match self {
            RunState::Running => "Running",
            RunState::Stopped => "Stopped",
            RunState::StartPending => "Start Pending",
            RunState::StopPending => "Stop Pending",
            RunState::ContinuePending => "Continue Pending",
            RunState::PausePending => "Pause Pending",
            RunState::Paused => "Paused",
            RunState::Other(o) if o.is_empty() => "Unknown",
            RunState::Other(o) => o,
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum StartMode { Automatic, Manual, Disabled, Boot, System, Other(String) }

impl StartMode {
    /// Accepts both the WMI spelling ("Auto") and the service-manager one ("Automatic").
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "automatic" => StartMode::Automatic,
            "manual" => StartMode::Manual,
            "disabled" => StartMode::Disabled,
            "boot" => StartMode::Boot,
            "system" => StartMode::System,
            _ => StartMode::Other(s.trim().to_string()),
        }
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &str = match self {
            StartMode::Automatic => "Automatic",
            StartMode::Manual => "Manual",
            StartMode::Disabled => "Disabled",
            StartMode::Boot => "Boot",
            StartMode::System => "System",
            StartMode::Other(o) if o.is_empty() => "Unknown",
            StartMode::Other(o) => o,
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub name: String,
    pub display_name: String,
    pub state: RunState,
    pub start_mode: StartMode,
}

impl ServiceRecord {
    /// Not running while its start mode says it should be. Disabled services are never flagged.
    pub fn is_unhealthy(&self) -> bool {
        self.state != RunState::Running && self.start_mode != StartMode::Disabled
    }
}

impl From<RawService> for ServiceRecord {
    fn from(r: RawService) -> Self {
        Self { state: RunState::parse(&r.state), start_mode: StartMode::parse(&r.start_mode), name: r.name, display_name: r.display_name }
    }
}

pub fn collect_services(host: &dyn HostQuery, names: &[String]) -> Vec<ServiceRecord> {
    let mut out = Vec::new();
    for name in names {
        match host.service(name) {
            Ok(Some(raw)) => out.push(ServiceRecord::from(raw)),
            Ok(None) => log::debug!("Service {} is not installed; skipping", name),
            Err(e) => { log::warn!("Service check failed: {:#}", e); return Vec::new(); }
        }
    }
    print_table(&out);
    out
}

fn print_table(services: &[ServiceRecord]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![crate::paint("Name", "1"), crate::paint("Display Name", "1"), crate::paint("Status", "1"), crate::paint("Start Type", "1")]);
    for s in services {
        let status = crate::paint(&s.state.to_string(), if s.is_unhealthy() { "1;31" } else { "1;32" });
        table.add_row(vec![s.name.clone(), crate::truncate(&s.display_name, 40), status, s.start_mode.to_string()]);
    }
    println!("{}", table);
}
