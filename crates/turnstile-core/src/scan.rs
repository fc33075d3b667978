//! Scan input normalization and debouncing.
//!
//! A camera decoder reports the same code on every frame it stays in view.
//! [`ScanDebouncer`] lets a read through if it differs from the last
//! dispatched one or if the cooldown has elapsed since that dispatch.

use std::time::{Duration, Instant};

/// Prefix `zbarcam` puts in front of decoded QR payloads.
const QR_PREFIX: &str = "QR-Code:";

/// Clean up one line of decoder output. `None` if nothing remains.
#[must_use]
pub fn normalize(line: &str) -> Option<&str> {
    let line = line.trim();
    let data = line.strip_prefix(QR_PREFIX).unwrap_or(line).trim();
    (!data.is_empty()).then_some(data)
}

/// Suppresses repeated reads of the same code.
#[derive(Debug, Clone)]
pub struct ScanDebouncer {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl ScanDebouncer {
    /// A debouncer with the given cooldown.
    #[must_use]
    pub const fn new(cooldown: Duration) -> Self {
        Self { cooldown, last: None }
    }

    /// Decide whether `data` should be dispatched now, recording it if so.
    pub fn admit(&mut self, data: &str) -> bool {
        self.admit_at(data, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&mut self, data: &str, now: Instant) -> bool {
        let pass = match &self.last {
            None => true,
            Some((last, at)) => last != data || now.saturating_duration_since(*at) > self.cooldown,
        };
        if pass {
            self.last = Some((data.to_string(), now));
        }
        pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_prefix_and_whitespace() {
        assert_eq!(normalize("QR-Code:ABC123\n"), Some("ABC123"));
        assert_eq!(normalize("  ABC123  "), Some("ABC123"));
        assert_eq!(normalize("QR-Code:"), None);
        assert_eq!(normalize("   "), None);
    }

    #[test]
    fn test_repeat_within_cooldown_is_suppressed() {
        let mut debouncer = ScanDebouncer::new(Duration::from_secs(3));
        let t0 = Instant::now();

        assert!(debouncer.admit_at("ABC", t0));
        assert!(!debouncer.admit_at("ABC", t0 + Duration::from_secs(1)));
        assert!(!debouncer.admit_at("ABC", t0 + Duration::from_secs(3)));
        assert!(debouncer.admit_at("ABC", t0 + Duration::from_millis(3_001)));
    }

    #[test]
    fn test_different_code_passes_immediately() {
        let mut debouncer = ScanDebouncer::new(Duration::from_secs(3));
        let t0 = Instant::now();

        assert!(debouncer.admit_at("ABC", t0));
        assert!(debouncer.admit_at("XYZ", t0 + Duration::from_millis(10)));
        // XYZ is now the last dispatched code
        assert!(debouncer.admit_at("ABC", t0 + Duration::from_millis(20)));
    }

    #[test]
    fn test_suppressed_read_does_not_extend_cooldown() {
        let mut debouncer = ScanDebouncer::new(Duration::from_secs(3));
        let t0 = Instant::now();

        assert!(debouncer.admit_at("ABC", t0));
        assert!(!debouncer.admit_at("ABC", t0 + Duration::from_secs(2)));
        assert!(debouncer.admit_at("ABC", t0 + Duration::from_secs(4)));
    }
}
