use chrono::{DateTime, Duration, Local, Utc};
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use crate::host::HostQuery;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity { Error, Warning }

impl Severity {
    /// Maps an event-log level; only Error (2) and Warning (3) are kept.
    pub fn from_level(level: u8) -> Option<Self> {
        match level { 2 => Some(Severity::Error), 3 => Some(Severity::Warning), _ => None }
    }

    pub fn label(self) -> &'static str {
        match self { Severity::Error => "Error", Severity::Warning => "Warning" }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EventRecord {
    pub time: DateTime<Utc>,
    pub id: u32,
    pub severity: Severity,
    pub provider: String,
    pub channel: String,
    pub message: String,
}

/// Outcome of the event-log check. `Unavailable` means the query failed,
/// which is not the same thing as finding nothing.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", content = "entries", rename_all = "lowercase")]
pub enum EventScan {
    Entries(Vec<EventRecord>),
    Unavailable,
}

impl EventScan {
    pub fn entries(&self) -> Option<&[EventRecord]> {
        match self { EventScan::Entries(v) => Some(v), EventScan::Unavailable => None }
    }
}

/// XPath filter for Error and Warning entries created at or after `since`.
/// This is the bare form used with a channel path, so comparisons are not entity-escaped.
pub fn event_query(since: DateTime<Utc>) -> String {
    format!("*[System[(Level=2 or Level=3) and TimeCreated[@SystemTime>='{}']]]", since.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
}

/// Keeps entries inside `[since, now]`, newest first, at most `max`.
pub fn select_recent(mut records: Vec<EventRecord>, since: DateTime<Utc>, now: DateTime<Utc>, max: usize) -> Vec<EventRecord> {
    records.retain(|e| e.time >= since && e.time <= now);
    records.sort_by(|a, b| b.time.cmp(&a.time));
    records.truncate(max);
    records
}

pub fn collect_events(host: &dyn HostQuery, channels: &[String], window: Duration, max: usize, now: DateTime<Utc>) -> EventScan {
    let max = if max == 0 {
        log::warn!("Event cap of 0 would hide every entry; using {}", crate::config::DEFAULT_MAX_EVENTS);
        crate::config::DEFAULT_MAX_EVENTS
    } else { max };
    let since = now - window;
    let mut all = Vec::new();
    for ch in channels {
        match host.events(ch, since, max) {
            Ok(v) => { log::debug!("{} entries from {}", v.len(), ch); all.extend(v); }
            Err(e) => {
                log::warn!("Event log check failed: {:#}", e);
                return EventScan::Unavailable;
            }
        }
    }
    let recent = select_recent(all, since, now, max);
    if recent.is_empty() {
        log::info!("Event log check: no errors or warnings in the last {} hours", window.num_hours());
    }
    print_table(&recent);
    EventScan::Entries(recent)
}

fn print_table(events: &[EventRecord]) {
    if events.is_empty() {
        println!("{}", crate::paint("No errors or warnings found.", "32"));
        return;
    }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![crate::paint("Time", "1"), crate::paint("Id", "1"), crate::paint("Level", "1"), crate::paint("Provider", "1"), crate::paint("Message", "1")]);
    for e in events {
        let sev = crate::paint(e.severity.label(), match e.severity { Severity::Error => "31", Severity::Warning => "33" });
        table.add_row(vec![
            e.time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            e.id.to_string(),
            sev,
            crate::truncate(&e.provider, 30),
            crate::truncate(&e.message.replace(['\r', '\n'], " "), 80),
        ]);
    }
    println!("{}", table);
}

#[cfg(test)]
pub fn sample_event(time: DateTime<Utc>, id: u32, severity: Severity) -> EventRecord {
    EventRecord { time, id, severity, provider: "Disk".to_string(), channel: "System".to_string(), message: format!("Event {}", id) }
}
