use chrono::{DateTime, Days, Duration, NaiveTime, Utc};

/// Thrice-daily refresh checkpoints with a lead window and a max-age ceiling.
///
/// A cached chain is stale when it is missing, older than `max_age`, or was
/// stored before the most recent refresh window opened. Each window opens
/// `lead` before its checkpoint, so a chain cached inside the window is kept
/// until the next one.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    checkpoints: Vec<NaiveTime>,
    lead: Duration,
    max_age: Duration,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        let checkpoints = [(13, 30), (16, 30), (20, 0)]
            .iter()
            .filter_map(|&(h, m)| NaiveTime::from_hms_opt(h, m, 0))
            .collect();
        Self::new(checkpoints, Duration::minutes(30), Duration::hours(8))
    }
}

impl RefreshSchedule {
    pub fn new(mut checkpoints: Vec<NaiveTime>, lead: Duration, max_age: Duration) -> Self {
        checkpoints.sort();
        checkpoints.dedup();
        Self {
            checkpoints,
            lead,
            max_age,
        }
    }

    /// Parse `HH:MM` entries separated by commas.
    pub fn parse_checkpoints(raw: &str) -> Result<Vec<NaiveTime>, chrono::ParseError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| NaiveTime::parse_from_str(s, "%H:%M"))
            .collect()
    }

    pub fn checkpoints(&self) -> &[NaiveTime] {
        &self.checkpoints
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn checkpoints_around(&self, now: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let today = now.date_naive();
        [today.checked_sub_days(Days::new(1)), Some(today), today.checked_add_days(Days::new(1))]
            .into_iter()
            .flatten()
            .flat_map(move |day| self.checkpoints.iter().map(move |t| day.and_time(*t).and_utc()))
    }

    /// Next checkpoint at or after `now`.
    pub fn next_checkpoint(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.checkpoints_around(now).filter(|t| *t >= now).min()
    }

    /// Opening time of the latest refresh window that has started by `now`.
    pub fn last_window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.checkpoints_around(now)
            .map(|t| t - self.lead)
            .filter(|start| *start <= now)
            .max()
    }

    /// Whether an entry cached at `cached_at` must be refetched at `now`.
    ///
    /// True when there is no entry, when it is older than `max_age`, or when it
    /// was cached before the latest refresh window (checkpoint minus lead)
    /// that has opened by `now`. The last case also covers windows that passed
    /// with no request at all: an entry from before a missed window is stale
    /// even when it is younger than `max_age` and `now` is nowhere near the
    /// next checkpoint.
    pub fn needs_refresh(&self, cached_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(cached_at) = cached_at else {
            return true;
        };
        if now - cached_at > self.max_age {
            return true;
        }
        self.last_window_start(now)
            .is_some_and(|window_start| cached_at < window_start)
    }
}
