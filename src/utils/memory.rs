//! Best-effort process memory sampling for telemetry records.

/// Resident memory of the current process in megabytes, rounded to two
/// decimal places. Returns `None` on platforms without a cheap source.
#[must_use]
pub fn memory_usage_mb() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        // statm reports sizes in pages; field 1 is the resident set.
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        let mb = pages * 4096.0 / (1024.0 * 1024.0);
        Some((mb * 100.0).round() / 100.0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn reports_positive_usage_on_linux() {
        let mb = memory_usage_mb().expect("statm should be readable");
        assert!(mb > 0.0);
    }
}
