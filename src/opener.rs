use std::path::Path;

/// Hands a finished file to the desktop. Implementations must not fail the run.
pub trait Opener {
    fn open(&self, path: &Path);
}

/// Opens with the OS default handler; spawn failures are only logged.
pub struct DefaultOpener;

/// Does nothing. Used for `--no-open` and in tests.
pub struct NoOpen;

impl Opener for NoOpen {
    fn open(&self, path: &Path) { log::debug!("Not opening {}", path.to_string_lossy()); }
}

#[cfg(target_os = "windows")]
impl Opener for DefaultOpener {
    fn open(&self, path: &Path) {
        let mut s = path.to_string_lossy().into_owned();
        if s.starts_with("\\\\?\\") { s = s.trim_start_matches("\\\\?\\").to_string(); }
        let _ = std::process::Command::new("explorer").arg(&s).spawn()
            .or_else(|_| std::process::Command::new("cmd").args(["/C", "start", "", &s]).spawn())
            .map_err(|e| log::warn!("Failed to open report {}: {}", s, e));
    }
}

#[cfg(not(target_os = "windows"))]
impl Opener for DefaultOpener {
    fn open(&self, path: &Path) {
        let s = path.to_string_lossy().into_owned();
        let _ = std::process::Command::new("xdg-open").arg(&s).spawn().map_err(|e| log::warn!("Failed to open report {}: {}", s, e));
    }
}
