use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;

/// The `<System>` fields of a rendered event plus its `<EventData>` values in document order.
#[derive(Clone, Debug, Default)]
pub struct ParsedEvent {
    pub time: Option<DateTime<Utc>>,
    pub level: u8,
    pub event_id: u32,
    pub provider: String,
    pub channel: String,
    pub data: Vec<String>,
}

impl ParsedEvent {
    /// EventData values joined; used when the provider has no message template.
    pub fn data_message(&self) -> String {
        self.data.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect::<Vec<_>>().join("; ")
    }
}

pub fn parse_event_xml(xml: &str) -> Option<ParsedEvent> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = ParsedEvent::default();
    let mut cur = String::new();
    let mut in_event_data = false;
    let mut data_open = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Empty(e)) => {
                for a in e.attributes().flatten() {
                    match (e.name().as_ref(), a.key.as_ref()) {
                        (b"TimeCreated", b"SystemTime") => out.time = parse_system_time(&a.unescape_value().ok()?),
                        (b"Provider", b"Name") => out.provider = a.unescape_value().ok()?.to_string(),
                        _ => {}
                    }
                }
            }
            Ok(XmlEvent::Start(e)) => {
                cur = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match cur.as_str() {
                    "TimeCreated" => {
                        for a in e.attributes().flatten() {
                            if a.key.as_ref() == b"SystemTime" {
                                let v = a.unescape_value().ok()?.to_string();
                                out.time = parse_system_time(&v);
                            }
                        }
                    }
                    "Provider" => {
                        for a in e.attributes().flatten() {
                            if a.key.as_ref() == b"Name" { out.provider = a.unescape_value().ok()?.to_string(); }
                        }
                    }
                    "EventData" | "UserData" => in_event_data = true,
                    "Data" if in_event_data => data_open = true,
                    _ => {}
                }
            }
            Ok(XmlEvent::End(e)) => {
                match e.name().as_ref() {
                    b"EventData" | b"UserData" => in_event_data = false,
                    b"Data" => data_open = false,
                    _ => {}
                }
                cur.clear();
            }
            Ok(XmlEvent::Text(t)) => {
                let v = t.unescape().map(|c| c.into_owned()).unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                match cur.as_str() {
                    "Level" => { if let Ok(n) = v.trim().parse::<u8>() { out.level = n; } }
                    "EventID" => { if let Ok(n) = v.trim().parse::<u32>() { out.event_id = n; } }
                    "Channel" => out.channel = v,
                    _ if in_event_data && (data_open || cur != "Data") => out.data.push(v),
                    _ => {}
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
    out.time?;
    Some(out)
}

pub fn parse_system_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.with_timezone(&Utc)); }
    let mut alt = s.replace(' ', "T");
    if !alt.ends_with('Z') && !alt.contains('+') { alt.push('Z'); }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&alt) { return Some(dt.with_timezone(&Utc)); }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") { return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)); }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISK_XML: &str = "<Event xmlns=\"http://schemas.microsoft.com/win/2004/08/events/event\"><System><Provider Name=\"Disk\"/><EventID Qualifiers=\"49156\">7</EventID><Level>2</Level><TimeCreated SystemTime=\"2025-11-30T12:00:00.1234567Z\"/><Channel>System</Channel></System><EventData><Data>\\Device\\Harddisk1\\DR1</Data><Data></Data><Data>bad &amp; block</Data></EventData></Event>";

    #[test]
    fn parses_system_fields() {
        let e = parse_event_xml(DISK_XML).unwrap();
        assert_eq!(e.provider, "Disk");
        assert_eq!(e.event_id, 7);
        assert_eq!(e.level, 2);
        assert_eq!(e.channel, "System");
        assert_eq!(e.time.unwrap().format("%Y-%m-%d %H:%M:%S").to_string(), "2025-11-30 12:00:00");
    }

    #[test]
    fn event_data_is_joined_in_order_and_unescaped() {
        let e = parse_event_xml(DISK_XML).unwrap();
        assert_eq!(e.data_message(), "\\Device\\Harddisk1\\DR1; bad & block");
    }

    #[test]
    fn missing_time_is_rejected() {
        assert!(parse_event_xml("<Event><System><Level>2</Level></System></Event>").is_none());
    }

    #[test]
    fn system_time_accepts_space_separated_form() {
        let t = parse_system_time("2025-11-30 12:00:00").unwrap();
        assert_eq!(t.format("%H:%M").to_string(), "12:00");
    }
}
