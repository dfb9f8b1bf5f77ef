use chrono::{DateTime, Utc};
use crate::events::EventRecord;

/// A local volume as reported by the OS, before any unit conversion.
#[derive(Clone, Debug)]
pub struct RawVolume {
    pub drive: String,
    pub size_bytes: u64,
    pub free_bytes: u64,
}

/// A service as reported by the service manager; state and start mode are the OS spellings.
#[derive(Clone, Debug)]
pub struct RawService {
    pub name: String,
    pub display_name: String,
    pub state: String,
    pub start_mode: String,
}

/// The three OS queries the collectors depend on.
///
/// Every method is a blocking round-trip. Errors are query faults; a service
/// that is not installed is `Ok(None)`, not an error.
pub trait HostQuery {
    fn fixed_volumes(&self) -> anyhow::Result<Vec<RawVolume>>;
    fn service(&self, name: &str) -> anyhow::Result<Option<RawService>>;
    /// Error and Warning entries of `channel` created at or after `since`, newest first, at most `limit`.
    fn events(&self, channel: &str, since: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<EventRecord>>;
}

pub fn machine_name() -> String {
    normalize_machine_name(&gethostname::gethostname().to_string_lossy())
}

fn normalize_machine_name(raw: &str) -> String {
    let s = raw.trim().trim_end_matches('\0');
    if s.is_empty() { "localhost".to_string() } else { s.to_string() }
}

#[cfg(target_os = "windows")]
pub use self::windows::WindowsHost;

#[cfg(target_os = "windows")]
mod windows {
    use super::*;
    use serde::Deserialize;
    use wmi::WMIConnection;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WmiU64 { Num(u64), Text(String) }

    fn lenient_u64<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let v: Option<WmiU64> = Option::deserialize(d)?;
        Ok(match v { Some(WmiU64::Num(n)) => Some(n), Some(WmiU64::Text(s)) => s.trim().parse().ok(), None => None })
    }

    #[derive(Debug, Deserialize)]
    struct DiskRow {
        #[serde(rename = "DeviceID")] device_id: Option<String>,
        #[serde(rename = "Size", default, deserialize_with = "lenient_u64")] size: Option<u64>,
        #[serde(rename = "FreeSpace", default, deserialize_with = "lenient_u64")] free_space: Option<u64>,
    }

    #[derive(Debug, Deserialize)]
    struct ServiceRow {
        #[serde(rename = "Name")] name: Option<String>,
        #[serde(rename = "DisplayName")] display_name: Option<String>,
        #[serde(rename = "State")] state: Option<String>,
        #[serde(rename = "StartMode")] start_mode: Option<String>,
    }

    /// Live host: WMI for volumes and services, the Event Log API for events.
    pub struct WindowsHost { wmi: Option<WMIConnection> }

    impl WindowsHost {
        pub fn new() -> Self {
            let wmi = match WMIConnection::new() {
                Ok(c) => Some(c),
                Err(e) => { log::warn!("WMI connection failed: {}", e); None }
            };
            Self { wmi }
        }

        fn wmi(&self) -> anyhow::Result<&WMIConnection> {
            self.wmi.as_ref().ok_or_else(|| anyhow::anyhow!("WMI is not available"))
        }
    }

    impl HostQuery for WindowsHost {
        fn fixed_volumes(&self) -> anyhow::Result<Vec<RawVolume>> {
            let rows: Vec<DiskRow> = self.wmi()?.raw_query("SELECT DeviceID, Size, FreeSpace FROM Win32_LogicalDisk WHERE DriveType = 3")?;
            Ok(rows.into_iter().filter_map(|r| {
                Some(RawVolume { drive: r.device_id?, size_bytes: r.size.unwrap_or(0), free_bytes: r.free_space.unwrap_or(0) })
            }).collect())
        }

        fn service(&self, name: &str) -> anyhow::Result<Option<RawService>> {
            let q = format!("SELECT Name, DisplayName, State, StartMode FROM Win32_Service WHERE Name = '{}'", name.replace('\'', "''"));
            let rows: Vec<ServiceRow> = self.wmi()?.raw_query(&q)?;
            Ok(rows.into_iter().next().map(|r| RawService {
                name: r.name.unwrap_or_else(|| name.to_string()),
                display_name: r.display_name.unwrap_or_default(),
                state: r.state.unwrap_or_default(),
                start_mode: r.start_mode.unwrap_or_default(),
            }))
        }

        fn events(&self, channel: &str, since: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<EventRecord>> {
            crate::windows_live::query_recent_events(channel, since, limit)
        }
    }
}

/// Stand-in used on platforms without WMI or the Event Log API; every query fails.
#[cfg(not(target_os = "windows"))]
pub struct WindowsHost;

#[cfg(not(target_os = "windows"))]
impl WindowsHost {
    pub fn new() -> Self { Self }
}

#[cfg(not(target_os = "windows"))]
impl HostQuery for WindowsHost {
    fn fixed_volumes(&self) -> anyhow::Result<Vec<RawVolume>> { anyhow::bail!("volume queries require Windows") }
    fn service(&self, _name: &str) -> anyhow::Result<Option<RawService>> { anyhow::bail!("service queries require Windows") }
    fn events(&self, _channel: &str, _since: DateTime<Utc>, _limit: usize) -> anyhow::Result<Vec<EventRecord>> { anyhow::bail!("event log queries require Windows") }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;

    /// Scripted host for tests. `None` fields make the matching query fail.
    #[derive(Default)]
    pub struct FakeHost {
        pub volumes: Option<Vec<RawVolume>>,
        pub services: Option<HashMap<String, RawService>>,
        pub events: Option<HashMap<String, Vec<EventRecord>>>,
    }

    impl HostQuery for FakeHost {
        fn fixed_volumes(&self) -> anyhow::Result<Vec<RawVolume>> {
            self.volumes.clone().ok_or_else(|| anyhow::anyhow!("access denied"))
        }
        fn service(&self, name: &str) -> anyhow::Result<Option<RawService>> {
            let m = self.services.as_ref().ok_or_else(|| anyhow::anyhow!("service manager unavailable"))?;
            Ok(m.get(name).cloned())
        }
        fn events(&self, channel: &str, _since: DateTime<Utc>, _limit: usize) -> anyhow::Result<Vec<EventRecord>> {
            let m = self.events.as_ref().ok_or_else(|| anyhow::anyhow!("channel {} not found", channel))?;
            Ok(m.get(channel).cloned().unwrap_or_default())
        }
    }

    pub fn svc(name: &str, state: &str, mode: &str) -> RawService {
        RawService { name: name.to_string(), display_name: format!("{} display", name), state: state.to_string(), start_mode: mode.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_name_comes_from_the_os() {
        let os = gethostname::gethostname().to_string_lossy().trim().to_string();
        if !os.is_empty() { assert_eq!(machine_name(), os); }
        assert!(!machine_name().is_empty());
    }

    #[test]
    fn blank_host_name_falls_back_to_localhost() {
        assert_eq!(normalize_machine_name("  "), "localhost");
        assert_eq!(normalize_machine_name("WS-01\n"), "WS-01");
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn stand_in_host_fails_every_query() {
        let h = WindowsHost::new();
        assert!(h.fixed_volumes().is_err());
        assert!(h.service("Spooler").is_err());
        assert!(h.events("System", Utc::now(), 20).is_err());
    }
}
