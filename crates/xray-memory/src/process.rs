/// Best-effort: resident set size of the current process in bytes.
///
/// Linux reads `VmRSS` from `/proc/self/status`; other platforms ask
/// `sysinfo`. Returns `None` when neither source is available.
pub fn current_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => status,
            Err(err) => {
                // `/proc` may be hidden in sandboxes; only unexpected errors are worth a log line.
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(
                        target: "xray.memory",
                        error = %err,
                        "failed to read /proc/self/status while sampling rss"
                    );
                }
                return None;
            }
        };
        parse_vm_rss(&status)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = sysinfo::System::new();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    for line in status.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix("VmRSS:") else {
            continue;
        };
        let kb = rest.split_whitespace().next()?;
        return match kb.parse::<u64>() {
            Ok(kb) => Some(kb.saturating_mul(1024)),
            Err(err) => {
                // Log once; the sampler runs on every check.
                static REPORTED: std::sync::OnceLock<()> = std::sync::OnceLock::new();
                if REPORTED.set(()).is_ok() {
                    tracing::debug!(
                        target: "xray.memory",
                        value = kb,
                        error = %err,
                        "failed to parse VmRSS from /proc/self/status"
                    );
                }
                None
            }
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vm_rss_in_kilobytes() {
        let status = "Name:\txray\nVmPeak:\t  9000 kB\nVmRSS:\t    2048 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(2048 * 1024));
    }

    #[test]
    fn missing_or_malformed_vm_rss_is_none() {
        assert_eq!(parse_vm_rss("Name:\txray\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\tlots kB\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\n"), None);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn samples_rss_on_linux() {
        assert!(current_rss_bytes().is_some_and(|rss| rss > 0));
    }
}
