use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use crate::host::HostQuery;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Capacity of one fixed volume. Sizes are GB (2^30 bytes) rounded to two decimals.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiskRecord {
    pub drive: String,
    pub total_gb: f64,
    pub free_gb: f64,
    pub free_percent: u8,
    pub used_percent: u8,
}

impl DiskRecord {
    /// `None` for zero-sized volumes. Both percentages are rounded independently from raw bytes,
    /// so on a .5 boundary they can sum to 101.
    pub fn from_bytes(drive: &str, total_bytes: u64, free_bytes: u64) -> Option<Self> {
        if total_bytes == 0 { return None; }
        let free_bytes = free_bytes.min(total_bytes);
        Some(Self {
            drive: drive.to_string(),
            total_gb: round2(total_bytes as f64 / BYTES_PER_GB),
            free_gb: round2(free_bytes as f64 / BYTES_PER_GB),
            free_percent: percent_of(free_bytes, total_bytes),
            used_percent: percent_of(total_bytes - free_bytes, total_bytes),
        })
    }
}

fn round2(v: f64) -> f64 { (v * 100.0).round() / 100.0 }

fn percent_of(part: u64, total: u64) -> u8 { (100.0 * part as f64 / total as f64).round().clamp(0.0, 100.0) as u8 }

pub fn collect_disks(host: &dyn HostQuery) -> Vec<DiskRecord> {
    let volumes = match host.fixed_volumes() {
        Ok(v) => v,
        Err(e) => { log::warn!("Disk check failed: {:#}", e); return Vec::new(); }
    };
    let disks: Vec<DiskRecord> = volumes.iter().filter_map(|v| {
        let rec = DiskRecord::from_bytes(&v.drive, v.size_bytes, v.free_bytes);
        if rec.is_none() { log::debug!("Skipping zero-sized volume {}", v.drive); }
        rec
    }).collect();
    print_table(&disks);
    disks
}

fn print_table(disks: &[DiskRecord]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![crate::paint("Drive", "1"), crate::paint("Total (GB)", "1"), crate::paint("Free (GB)", "1"), crate::paint("Free %", "1"), crate::paint("Used %", "1")]);
    for d in disks {
        let used = if d.used_percent >= 90 { crate::paint(&format!("{}%", d.used_percent), "1;31") } else { format!("{}%", d.used_percent) };
        table.add_row(vec![d.drive.clone(), format!("{:.2}", d.total_gb), format!("{:.2}", d.free_gb), format!("{}%", d.free_percent), used]);
    }
    println!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RawVolume;
    use crate::host::fake::FakeHost;

    const GB: u64 = 1 << 30;

    #[test]
    fn five_hundred_with_one_hundred_free_is_eighty_percent() {
        let d = DiskRecord::from_bytes("C:", 500 * GB, 100 * GB).unwrap();
        assert_eq!(d.total_gb, 500.00);
        assert_eq!(d.free_gb, 100.00);
        assert_eq!(d.used_percent, 80);
        assert_eq!(d.free_percent, 20);
    }

    #[test]
    fn used_percent_rounds_to_nearest() {
        let d = DiskRecord::from_bytes("D:", 1000, 334).unwrap();
        assert_eq!(d.used_percent, 67);
        let d = DiskRecord::from_bytes("D:", 1000, 335).unwrap();
        assert_eq!(d.used_percent, 67);
        let d = DiskRecord::from_bytes("D:", 1000, 336).unwrap();
        assert_eq!(d.used_percent, 66);
    }

    #[test]
    fn used_percent_stays_in_bounds() {
        for (total, free) in [(GB, 0), (GB, GB), (GB, 2 * GB), (3, 1), (u64::MAX, 7)] {
            let d = DiskRecord::from_bytes("X:", total, free).unwrap();
            assert!(d.used_percent <= 100);
            assert!(d.free_percent <= 100);
        }
    }

    #[test]
    fn free_percent_is_rounded_from_bytes() {
        let d = DiskRecord::from_bytes("D:", 1000, 335).unwrap();
        assert_eq!(d.used_percent, 67);
        assert_eq!(d.free_percent, 34);
        let d = DiskRecord::from_bytes("D:", 1000, 334).unwrap();
        assert_eq!(d.free_percent, 33);
    }

    #[test]
    fn gb_figures_have_two_decimals() {
        let d = DiskRecord::from_bytes("E:", 1_500_000_000, 750_000_000).unwrap();
        assert_eq!(d.total_gb, 1.40);
        assert_eq!(d.free_gb, 0.70);
    }

    #[test]
    fn zero_sized_volume_is_skipped() {
        assert!(DiskRecord::from_bytes("F:", 0, 0).is_none());
        let host = FakeHost { volumes: Some(vec![
            RawVolume { drive: "C:".to_string(), size_bytes: 500 * GB, free_bytes: 100 * GB },
            RawVolume { drive: "F:".to_string(), size_bytes: 0, free_bytes: 0 },
        ]), ..Default::default() };
        let disks = collect_disks(&host);
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].drive, "C:");
    }

    #[test]
    fn query_fault_yields_empty_set() {
        assert!(collect_disks(&FakeHost::default()).is_empty());
    }
}
