use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Days,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Timelike,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::PlanError;

const TIMEZONE_CONFIG_FILE: &str =
  "dayplan-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DAYPLAN_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DAYPLAN_TIME_CONFIG";

pub const MINUTES_PER_DAY: u32 =
  24 * 60;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Resolves the single timezone used for
/// calendar days, wall-clock minutes and
/// day-range queries.
///
/// Precedence: `$DAYPLAN_TIMEZONE`, the
/// `timezone` config key, a
/// `dayplan-time.toml` file, then UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured canonical timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Maps a wall-clock reading in `tz` to an
/// instant. Ambiguous readings (DST
/// fall-back) take the earlier instant;
/// readings inside a DST gap are rejected.
pub fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: &Tz,
  context: &str
) -> Result<DateTime<Utc>, PlanError> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(PlanError::InvalidTime(
        context.to_string()
      ))
    }
  }
}

/// Normalizes the calendar-date encodings
/// seen in task payloads to a `NaiveDate`.
///
/// Timestamps keep the date as written in
/// their own offset. Anything else is an
/// error; there is no fallback date.
pub fn parse_calendar_date(
  input: &str
) -> Result<NaiveDate, PlanError> {
  let token = input.trim();

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.date_naive());
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(ndt.date());
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%m/%d/%Y"
    )
  {
    return Ok(date);
  }

  Err(PlanError::InvalidDate(
    input.to_string()
  ))
}

fn clock_regex() -> Option<&'static Regex>
{
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]\.?m\.?)?$",
      )
      .ok()
    })
    .as_ref()
}

/// Parses `15:23`, `3:23pm` or `03:23 PM`
/// into `(hour, minute)`.
pub fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  let captures = clock_regex()?
    .captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    let is_pm = ampm_match
      .as_str()
      .to_ascii_lowercase()
      .starts_with('p');
    match (is_pm, raw_hour) {
      | (false, 12) => 0,
      | (false, h) => h,
      | (true, 12) => 12,
      | (true, h) => h + 12
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

/// Resolves a start/end field against the
/// task's calendar day: either a full RFC
/// 3339 timestamp or a clock time anchored
/// on `date` in `tz`.
pub fn parse_time_on(
  date: NaiveDate,
  input: &str,
  tz: &Tz
) -> Result<DateTime<Utc>, PlanError> {
  let token = input.trim();

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  let (hour, minute) =
    parse_clock_time(token).ok_or_else(
      || {
        PlanError::InvalidTime(
          input.to_string()
        )
      }
    )?;
  let time =
    NaiveTime::from_hms_opt(
      hour, minute, 0
    )
    .ok_or_else(|| {
      PlanError::InvalidTime(
        input.to_string()
      )
    })?;

  to_utc_from_local(
    date.and_time(time),
    tz,
    input
  )
}

/// Half-open UTC range covering one
/// calendar day in the canonical timezone.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct DayRange {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>
}

impl DayRange {
  pub fn contains(
    &self,
    instant: DateTime<Utc>
  ) -> bool {
    self.start <= instant
      && instant < self.end
  }
}

#[must_use]
pub fn day_range(
  date: NaiveDate,
  tz: &Tz
) -> DayRange {
  let next = date
    .checked_add_days(Days::new(1))
    .unwrap_or(date);
  DayRange {
    start: start_of_day(date, tz),
    end:   start_of_day(next, tz)
  }
}

fn start_of_day(
  date: NaiveDate,
  tz: &Tz
) -> DateTime<Utc> {
  // A few zones skip local midnight on
  // DST days; the first valid hour starts
  // the day there.
  (0..3)
    .filter_map(|hour| {
      let naive =
        date.and_hms_opt(hour, 0, 0)?;
      tz.from_local_datetime(&naive)
        .earliest()
    })
    .next()
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|| {
      date
        .and_time(NaiveTime::MIN)
        .and_utc()
    })
}

#[must_use]
pub fn to_local_date(
  instant: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  instant.with_timezone(tz).date_naive()
}

/// Wall-clock minutes since local
/// midnight, `0..=1439`.
#[must_use]
pub fn minutes_since_midnight(
  instant: DateTime<Utc>,
  tz: &Tz
) -> u32 {
  let local = instant.with_timezone(tz);
  local.hour() * 60 + local.minute()
}

#[must_use]
pub fn format_clock(
  instant: DateTime<Utc>,
  tz: &Tz
) -> String {
  instant
    .with_timezone(tz)
    .format("%H:%M")
    .to_string()
}

/// The Monday-first week containing
/// `anchor`.
#[must_use]
pub fn week_days(
  anchor: NaiveDate
) -> [NaiveDate; 7] {
  let offset = anchor
    .weekday()
    .num_days_from_monday()
    as i64;
  let monday = anchor
    - Duration::days(offset);
  std::array::from_fn(|idx| {
    monday + Duration::days(idx as i64)
  })
}

pub mod calendar_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &date.format("%Y-%m-%d").to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_calendar_date(&raw)
      .map_err(serde::de::Error::custom)
  }
}
