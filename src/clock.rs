// =============================================================================
// Clock & Session — monotonic + wall time, DST-safe session windows
// =============================================================================
//
// All staleness and session logic consumes the `Clock` trait rather than
// calling `Instant::now()`/`Utc::now()` directly, so tests can inject a
// `FrozenClock` and advance it deterministically. The real implementation
// resolves local time through `chrono_tz` so DST transitions are handled by
// timezone-aware conversion instead of a fixed UTC offset.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::types::SessionPhase;

/// Local-time window boundary, e.g. the `[07:00, 16:00)` operating window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Window {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `t` falls in `[start, end)`, handling windows that cross
    /// midnight (end <= start).
    fn contains(&self, t: NaiveTime) -> bool {
        if self.end > self.start {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

/// Fixed daily break window: `[17:00, 18:00)` local.
pub fn break_window() -> Window {
    Window::new(
        NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
        NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
    )
}

/// Session-date roll boundary: `17:00` local.
fn session_roll_time() -> NaiveTime {
    NaiveTime::from_hms_opt(17, 0, 0).expect("valid time")
}

/// Abstracts monotonic and wall-clock time so engine logic never calls
/// `Instant::now()`/`Utc::now()` directly.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_unix_ms(&self) -> u64;

    /// Nanoseconds from an arbitrary, strictly non-decreasing origin. Only
    /// deltas between two calls are meaningful.
    fn now_mono_ns(&self) -> u64;

    /// Current local time in the canonical trading zone.
    fn local_now(&self) -> chrono::DateTime<Tz>;

    /// Session date (rolls at 17:00 local), formatted `YYYY-MM-DD`.
    fn session_date_iso(&self) -> String {
        let local = self.local_now();
        let date = if local.time() < session_roll_time() {
            local.date_naive()
        } else {
            local.date_naive() + chrono::Duration::days(1)
        };
        date.format("%Y-%m-%d").to_string()
    }

    fn is_break_window(&self) -> bool {
        break_window().contains(self.local_now().time())
    }

    fn in_operating_window(&self, window: Window) -> bool {
        window.contains(self.local_now().time())
    }

    fn session_phase(&self, operating_window: Window) -> SessionPhase {
        if self.is_break_window() {
            SessionPhase::Break
        } else if self.in_operating_window(operating_window) {
            SessionPhase::Operating
        } else {
            SessionPhase::Closed
        }
    }
}

/// Canonical trading zone. Parsed once; falls back to UTC with a logged
/// warning if the string is ever invalid (it is a compile-time constant
/// here, so this path is only exercised defensively).
fn canonical_tz() -> Tz {
    "America/Toronto".parse().unwrap_or_else(|_| {
        tracing::warn!("unrecognised canonical timezone — falling back to UTC");
        chrono_tz::UTC
    })
}

/// Real clock backed by the OS monotonic counter and wall clock.
pub struct SystemClock {
    mono_origin: std::time::Instant,
    tz: Tz,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            mono_origin: std::time::Instant::now(),
            tz: canonical_tz(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn now_mono_ns(&self) -> u64 {
        self.mono_origin.elapsed().as_nanos() as u64
    }

    fn local_now(&self) -> chrono::DateTime<Tz> {
        self.tz.from_utc_datetime(&chrono::Utc::now().naive_utc())
    }
}

/// Deterministic clock for tests. Both the monotonic and wall-clock
/// components are manually advanced; local time is computed from the
/// wall-clock field through the same `chrono_tz` path as `SystemClock`.
pub struct FrozenClock {
    unix_ms: AtomicU64,
    mono_ns: AtomicI64,
    tz: Tz,
}

impl FrozenClock {
    pub fn new(unix_ms: u64, mono_ns: u64) -> Self {
        Self {
            unix_ms: AtomicU64::new(unix_ms),
            mono_ns: AtomicI64::new(mono_ns as i64),
            tz: canonical_tz(),
        }
    }

    /// Advance both clocks by `delta_ms` of wall-clock time, keeping the
    /// monotonic clock in lockstep (tests rarely need them to diverge).
    pub fn advance_ms(&self, delta_ms: u64) {
        self.unix_ms.fetch_add(delta_ms, Ordering::SeqCst);
        self.mono_ns
            .fetch_add((delta_ms as i64) * 1_000_000, Ordering::SeqCst);
    }

    pub fn advance_mono_ns(&self, delta_ns: u64) {
        self.mono_ns.fetch_add(delta_ns as i64, Ordering::SeqCst);
    }

    pub fn set_unix_ms(&self, unix_ms: u64) {
        self.unix_ms.store(unix_ms, Ordering::SeqCst);
    }
}

impl Clock for FrozenClock {
    fn now_unix_ms(&self) -> u64 {
        self.unix_ms.load(Ordering::SeqCst)
    }

    fn now_mono_ns(&self) -> u64 {
        self.mono_ns.load(Ordering::SeqCst).max(0) as u64
    }

    fn local_now(&self) -> chrono::DateTime<Tz> {
        let secs = (self.now_unix_ms() / 1000) as i64;
        let nsecs = ((self.now_unix_ms() % 1000) * 1_000_000) as u32;
        let naive = chrono::DateTime::from_timestamp(secs, nsecs)
            .expect("valid unix timestamp")
            .naive_utc();
        self.tz.from_utc_datetime(&naive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_0700_1600() -> Window {
        Window::new(
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
    }

    /// Build a FrozenClock at a given UTC wall time, UTC being used here
    /// purely as the test harness's reference zone (the canonical zone is
    /// still America/Toronto internally).
    fn frozen_at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> FrozenClock {
        let naive = chrono::NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap();
        let unix_ms = naive.and_utc().timestamp_millis() as u64;
        FrozenClock::new(unix_ms, 0)
    }

    #[test]
    fn monotonic_clock_never_decreases_under_manual_advance() {
        let clock = FrozenClock::new(0, 1_000);
        let t0 = clock.now_mono_ns();
        clock.advance_mono_ns(500);
        let t1 = clock.now_mono_ns();
        assert!(t1 >= t0);
        assert_eq!(t1 - t0, 500);
    }

    #[test]
    fn break_window_is_17_to_18_local() {
        let w = break_window();
        assert!(w.contains(NaiveTime::from_hms_opt(17, 30, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(18, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(16, 59, 59).unwrap()));
    }

    #[test]
    fn operating_window_default_is_0700_1600() {
        let w = window_0700_1600();
        assert!(w.contains(NaiveTime::from_hms_opt(7, 0, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(15, 59, 59).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(16, 0, 0).unwrap()));
    }

    #[test]
    fn session_date_before_roll_matches_local_calendar_date() {
        // 2026-07-28 12:00 UTC is 08:00 local during EDT (UTC-4) — well
        // before the 17:00 roll, so the session date equals the local
        // calendar date.
        let clock = frozen_at(2026, 7, 28, 12, 0);
        assert_eq!(clock.session_date_iso(), "2026-07-28");
    }

    #[test]
    fn session_date_after_roll_advances_to_tomorrow() {
        // 2026-07-28 22:00 UTC is 18:00 local during EDT — past the 17:00
        // roll, so the session date is already the next calendar day.
        let clock = frozen_at(2026, 7, 28, 22, 0);
        assert_eq!(clock.session_date_iso(), "2026-07-29");
    }
}
