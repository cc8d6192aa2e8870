//! crates/paper_watch_core/src/gate.rs
//!
//! Pure policy deciding whether "now" is a moment worth checking the content
//! source, globally (the source's publishing window) and per subscription
//! (the daily re-check throttle).

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc, Weekday};

/// arXiv announces new papers Sunday through Thursday around 20:00 ET,
/// which is 06:00 in UTC+5. Nothing new appears on Friday and Saturday.
pub const DEFAULT_NO_UPDATE_WEEKDAYS: [Weekday; 2] = [Weekday::Fri, Weekday::Sat];
pub const DEFAULT_UPDATE_HOUR: u32 = 6;
pub const DEFAULT_UTC_OFFSET_SECS: i32 = 5 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub no_update_weekdays: Vec<Weekday>,
    /// Local hour before which the day's papers are not out yet.
    pub update_hour: u32,
    /// Offset in which weekdays, hours and calendar dates are evaluated.
    pub utc_offset: FixedOffset,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            no_update_weekdays: DEFAULT_NO_UPDATE_WEEKDAYS.to_vec(),
            update_hour: DEFAULT_UPDATE_HOUR,
            utc_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or(Utc.fix()),
        }
    }
}

/// Side-effect free; safe to call any number of times.
///
/// The per-subscription throttle uses calendar dates: a subscription is due
/// again once the local date differs from the date it was last checked on.
#[derive(Debug, Clone, Default)]
pub struct CheckGate {
    config: GateConfig,
}

impl CheckGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Whether the content source could have published anything new by `now`.
    pub fn in_window(&self, now: DateTime<Utc>, force: bool) -> bool {
        if force {
            return true;
        }
        let local = now.with_timezone(&self.config.utc_offset);
        if self.config.no_update_weekdays.contains(&local.weekday()) {
            return false;
        }
        local.hour() >= self.config.update_hour
    }

    /// Whether a subscription last checked at `last_checked` is due at `now`.
    pub fn eligible(
        &self,
        now: DateTime<Utc>,
        last_checked: Option<DateTime<Utc>>,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }
        match last_checked {
            None => true,
            Some(last) => {
                let offset = &self.config.utc_offset;
                last.with_timezone(offset).date_naive() < now.with_timezone(offset).date_naive()
            }
        }
    }
}
