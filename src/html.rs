use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::Context;
use chrono::{DateTime, Local};
use crate::disks::DiskRecord;
use crate::events::EventScan;
use crate::opener::Opener;
use crate::services::ServiceRecord;

pub const DISK_HEADING: &str = "Disk Space";
pub const SERVICE_HEADING: &str = "Service Status";
const MESSAGE_PREVIEW_CHARS: usize = 240;

const STYLE: &str = "body{margin:0;background:#f7fafc;color:#111827;font-family:Segoe UI,system-ui,-apple-system,Arial,sans-serif} \
.container{max-width:1200px;margin:0 auto;padding:24px} \
.header{margin-bottom:16px} .title{font-size:22px;font-weight:600} .sub{color:#6b7280;font-size:13px} \
.section{margin-top:20px} .section h2{margin:0 0 10px 0;font-size:17px;font-weight:600;border-bottom:2px solid #2563eb;padding-bottom:4px} \
.table{width:100%;border-collapse:collapse;background:#ffffff;border:1px solid #e5e7eb} \
.table th{background:#eef2f7;text-align:left;font-weight:600;padding:8px;border-bottom:1px solid #e5e7eb} \
.table td{padding:8px;border-bottom:1px solid #e5e7eb;vertical-align:top} \
.table tr:nth-child(even) td{background:#f9fafb} \
.status-ok{color:#16a34a;font-weight:700} .status-bad{color:#dc2626;font-weight:700} \
.sev-error{color:#dc2626;font-weight:600} .sev-warning{color:#d97706;font-weight:600} \
.message{white-space:pre-wrap;word-break:break-word} \
.notice{padding:12px;border-radius:6px;background:#ffffff;border:1px solid #e5e7eb} \
.notice.ok{color:#16a34a;font-weight:600} .notice.neutral{color:#6b7280}";

/// Values the report takes from its surroundings. Nothing here is read from the process environment.
#[derive(Clone, Debug)]
pub struct ReportContext {
    pub machine_name: String,
    pub output_dir: PathBuf,
    pub generated_at: DateTime<Local>,
    pub window_hours: i64,
}

impl ReportContext {
    pub fn event_heading(&self) -> String { format!("Recent Errors and Warnings (Last {} Hours)", self.window_hours) }
    pub fn no_events_notice(&self) -> String { format!("No errors or warnings found in the last {} hours.", self.window_hours) }
}

pub const EVENTS_UNAVAILABLE_NOTICE: &str = "Event log data unavailable.";

/// `<output_dir>/SystemHealthReport_<YYYYMMDD_HHMMSS>.html`. Two runs in the same second share a name.
pub fn report_path(ctx: &ReportContext) -> PathBuf {
    ctx.output_dir.join(format!("SystemHealthReport_{}.html", ctx.generated_at.format("%Y%m%d_%H%M%S")))
}

pub fn render_html(disks: &[DiskRecord], services: &[ServiceRecord], events: &EventScan, ctx: &ReportContext) -> String {
    let title = format!("System Health Report - {}", ctx.machine_name);
    let mut s = String::new();
    s.push_str("<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"/><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>");
    s.push_str(&format!("<title>{}</title><style>{}</style></head><body><div class=\"container\">", esc(&title), STYLE));
    s.push_str(&format!("<div class=\"header\"><div class=\"title\">{}</div><div class=\"sub\">Generated {}</div></div>", esc(&title), ctx.generated_at.format("%Y-%m-%d %H:%M:%S")));
    render_disks(&mut s, disks);
    render_services(&mut s, services);
    render_events(&mut s, events, ctx);
    s.push_str("</div></body></html>\n");
    s
}

fn render_disks(s: &mut String, disks: &[DiskRecord]) {
    s.push_str(&format!("<section class=\"section\" id=\"disks\"><h2>{}</h2>", DISK_HEADING));
    s.push_str("<table class=\"table\"><thead><tr><th>Drive</th><th>Total (GB)</th><th>Free (GB)</th><th>Free %</th><th>Used %</th></tr></thead><tbody>");
    for d in disks {
        s.push_str(&format!("<tr><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{}%</td><td>{}%</td></tr>", esc(&d.drive), d.total_gb, d.free_gb, d.free_percent, d.used_percent));
    }
    s.push_str("</tbody></table></section>");
}

fn render_services(s: &mut String, services: &[ServiceRecord]) {
    s.push_str(&format!("<section class=\"section\" id=\"services\"><h2>{}</h2>", SERVICE_HEADING));
    s.push_str("<table class=\"table\"><thead><tr><th>Name</th><th>Display Name</th><th>Status</th><th>Start Type</th></tr></thead><tbody>");
    for svc in services {
        let cls = if svc.is_unhealthy() { "status-bad" } else { "status-ok" };
        s.push_str(&format!("<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td></tr>",
            esc(&svc.name), esc(&svc.display_name), cls, esc(&svc.state.to_string()), esc(&svc.start_mode.to_string())));
    }
    s.push_str("</tbody></table></section>");
}

fn render_events(s: &mut String, events: &EventScan, ctx: &ReportContext) {
    s.push_str(&format!("<section class=\"section\" id=\"events\"><h2>{}</h2>", esc(&ctx.event_heading())));
    match events {
        EventScan::Unavailable => {
            s.push_str(&format!("<p class=\"notice neutral\">{}</p>", EVENTS_UNAVAILABLE_NOTICE));
        }
        EventScan::Entries(list) if list.is_empty() => {
            s.push_str(&format!("<p class=\"notice ok\">{}</p>", esc(&ctx.no_events_notice())));
        }
        EventScan::Entries(list) => {
            s.push_str("<table class=\"table\"><thead><tr><th>Time</th><th>Event ID</th><th>Level</th><th>Source</th><th>Message</th></tr></thead><tbody>");
            for e in list {
                let ts = e.time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
                let sev_cls = match e.severity { crate::events::Severity::Error => "sev-error", crate::events::Severity::Warning => "sev-warning" };
                let msg = if e.message.chars().count() > MESSAGE_PREVIEW_CHARS {
                    let preview: String = e.message.chars().take(MESSAGE_PREVIEW_CHARS).collect();
                    format!("{}...<details><summary>Show full</summary><div class=\"message\">{}</div></details>", esc(&preview), esc(&e.message))
                } else { esc(&e.message) };
                s.push_str(&format!("<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td class=\"message\">{}</td></tr>",
                    ts, e.id, sev_cls, e.severity.label(), esc(&e.provider), msg));
            }
            s.push_str("</tbody></table>");
        }
    }
    s.push_str("</section>");
}

fn esc(s: &str) -> String { quick_xml::escape::escape(s).into_owned() }

/// Writes `html` to a sibling temp file and renames it over `path`.
pub fn write_report(path: &Path, html: &str) -> anyhow::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create output directory {}", dir.to_string_lossy()))?;
    let file_name = path.file_name().with_context(|| format!("report path {} has no file name", path.to_string_lossy()))?;
    let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));
    let res = (|| -> anyhow::Result<()> {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("cannot create {}", tmp.to_string_lossy()))?;
        f.write_all(html.as_bytes()).with_context(|| format!("cannot write {}", tmp.to_string_lossy()))?;
        f.sync_all().with_context(|| format!("cannot flush {}", tmp.to_string_lossy()))?;
        drop(f);
        std::fs::rename(&tmp, path).with_context(|| format!("cannot move report into place at {}", path.to_string_lossy()))
    })();
    if res.is_err() { let _ = std::fs::remove_file(&tmp); }
    res
}

/// Renders, writes and opens the report; returns where it was written.
pub fn generate_report(disks: &[DiskRecord], services: &[ServiceRecord], events: &EventScan, ctx: &ReportContext, opener: &dyn Opener) -> anyhow::Result<PathBuf> {
    let path = report_path(ctx);
    let html = render_html(disks, services, events, ctx);
    write_report(&path, &html)?;
    log::info!("Report written to {}", path.to_string_lossy());
    opener.open(&path);
    Ok(path)
}
