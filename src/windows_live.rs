use std::ptr;
use chrono::{DateTime, Utc};
use crate::event_xml::parse_event_xml;
use crate::events::{EventRecord, Severity};
use windows_sys::Win32::System::EventLog::*;
use windows_sys::Win32::Foundation::GetLastError;

const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
const ERROR_NO_MORE_ITEMS: u32 = 259;
const INFINITE: u32 = u32::MAX;

struct Handle(EVT_HANDLE);
impl Drop for Handle { fn drop(&mut self) { unsafe { EvtClose(self.0); } } }

fn w(s: &str) -> Vec<u16> { let mut v = s.encode_utf16().collect::<Vec<u16>>(); v.push(0); v }

/// Error (2) and Warning (3) entries of one channel, newest first.
pub fn query_recent_events(channel: &str, since: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<EventRecord>> {
    let mut out = Vec::new();
    if limit == 0 { return Ok(out); }
    let q = crate::events::event_query(since);
    let path_w = w(channel);
    let q_w = w(&q);
    let h = unsafe { EvtQuery(0, path_w.as_ptr(), q_w.as_ptr(), (EvtQueryChannelPath | EvtQueryReverseDirection) as u32) };
    if h == 0 {
        let code = unsafe { GetLastError() };
        anyhow::bail!("EvtQuery failed for {}: error {}", channel, code);
    }
    let h = Handle(h);
    let mut arr: [EVT_HANDLE; 64] = [0; 64];
    'outer: loop {
        let mut returned: u32 = 0;
        let ok = unsafe { EvtNext(h.0, arr.len() as u32, arr.as_mut_ptr(), INFINITE, 0, &mut returned) };
        if ok == 0 {
            let code = unsafe { GetLastError() };
            if code != ERROR_NO_MORE_ITEMS && code != 0 { anyhow::bail!("EvtNext failed for {}: error {}", channel, code); }
            break;
        }
        if returned == 0 { break; }
        let batch: Vec<Handle> = arr.iter().take(returned as usize).map(|&ev| Handle(ev)).collect();
        for ev in &batch {
            if out.len() >= limit { break 'outer; }
            let Some(xml) = (unsafe { render_xml(ev.0) }) else { continue };
            let Some(parsed) = parse_event_xml(&xml) else { log::debug!("Skipping unparsable event in {}", channel); continue };
            let (Some(time), Some(severity)) = (parsed.time, Severity::from_level(parsed.level)) else { continue };
            let message = unsafe { format_message(&parsed.provider, ev.0) }.unwrap_or_else(|| parsed.data_message());
            out.push(EventRecord {
                time,
                id: parsed.event_id,
                severity,
                provider: parsed.provider.clone(),
                channel: if parsed.channel.is_empty() { channel.to_string() } else { parsed.channel.clone() },
                message,
            });
        }
    }
    Ok(out)
}

unsafe fn render_xml(ev: EVT_HANDLE) -> Option<String> {
    let mut used: u32 = 0;
    let mut count: u32 = 0;
    let ok = unsafe { EvtRender(0, ev, EvtRenderEventXml, 0, ptr::null_mut(), &mut used, &mut count) };
    let need = if ok == 0 { used } else { 0 };
    if need == 0 { return None; }
    let mut buf: Vec<u16> = vec![0u16; (need as usize).div_ceil(2)];
    if unsafe { EvtRender(0, ev, EvtRenderEventXml, need, buf.as_mut_ptr() as *mut _, &mut used, &mut count) } != 0 {
        let s = String::from_utf16_lossy(&buf);
        Some(s.trim_matches(char::from(0)).to_string())
    } else { None }
}

/// Message text from the provider's templates; `None` when the provider has no metadata.
unsafe fn format_message(provider: &str, ev: EVT_HANDLE) -> Option<String> {
    if provider.is_empty() { return None; }
    let prov_w = w(provider);
    let meta = unsafe { EvtOpenPublisherMetadata(0, prov_w.as_ptr(), ptr::null(), 0, 0) };
    if meta == 0 { return None; }
    let meta = Handle(meta);
    let mut used: u32 = 0;
    let ok = unsafe { EvtFormatMessage(meta.0, ev, 0, 0, ptr::null(), EvtFormatMessageEvent as u32, 0, ptr::null_mut(), &mut used) };
    if ok != 0 || unsafe { GetLastError() } != ERROR_INSUFFICIENT_BUFFER || used == 0 { return None; }
    let mut buf: Vec<u16> = vec![0u16; used as usize];
    if unsafe { EvtFormatMessage(meta.0, ev, 0, 0, ptr::null(), EvtFormatMessageEvent as u32, used, buf.as_mut_ptr(), &mut used) } == 0 { return None; }
    let s = String::from_utf16_lossy(&buf);
    let s = s.trim_matches(char::from(0)).trim().to_string();
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_channel_query_is_accepted() {
        let since = Utc::now() - chrono::Duration::hours(24);
        let out = query_recent_events("System", since, 5).unwrap();
        assert!(out.len() <= 5);
        assert!(out.iter().all(|e| e.time >= since));
        assert!(out.windows(2).all(|w| w[0].time >= w[1].time));
    }

    #[test]
    fn unknown_channel_is_an_error() {
        assert!(query_recent_events("NoSuchChannel-HealthSnap", Utc::now(), 5).is_err());
    }
}
