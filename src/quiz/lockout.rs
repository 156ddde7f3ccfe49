/// How long a wrong answer blocks further guesses.
pub const LOCKOUT_DURATION_SECS: i64 = 30 * 60;

/// A block on submissions that ends at a fixed epoch second.
///
/// Only the deadline is kept, never a running counter, so any tab and any
/// reload computes the same remaining time from the same stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lockout {
    ends_at: i64,
}

impl Lockout {
    /// The lockout caused by a wrong answer at `now`. The countdown shows
    /// 29:59 right away, hence the missing second.
    pub fn starting_at(now: i64) -> Self {
        Self {
            ends_at: now + LOCKOUT_DURATION_SECS - 1,
        }
    }

    pub fn until(ends_at: i64) -> Self {
        Self { ends_at }
    }

    pub fn ends_at(&self) -> i64 {
        self.ends_at
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.ends_at
    }

    pub fn remaining(&self, now: i64) -> i64 {
        (self.ends_at - now).max(0)
    }
}

/// Renders seconds as `mm:ss`.
pub fn format_countdown(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
