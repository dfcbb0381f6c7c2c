use std::fmt;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  warn
};

use crate::datastore::DEFAULT_TIMEOUT;

const RC_ENV_VAR: &str = "DAYPLANRC";
const RC_FILE_NAME: &str = ".dayplanrc";
const DATA_DIR_NAME: &str = ".dayplan";

const KNOWN_KEYS: [&str; 4] = [
  "data.location",
  "timezone",
  "store.timeout",
  "color"
];

/// Planner settings from `~/.dayplanrc`
/// and command-line overrides.
///
/// Every key is checked when it is set,
/// so a bad value fails at startup rather
/// than in the middle of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// `data.location`; `None` means
  /// `~/.dayplan`.
  pub data_location: Option<PathBuf>,
  /// `timezone`, an IANA zone id.
  pub timezone:      Option<String>,
  /// `store.timeout`, milliseconds.
  pub store_timeout: Duration,
  /// `color`
  pub color:         bool,
  pub source:        Option<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_location: None,
      timezone:      None,
      store_timeout: DEFAULT_TIMEOUT,
      color:         true,
      source:        None
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match locate_rc(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading dayplanrc");
        cfg.read_rc(&path)?;
      }
      | None => {
        debug!(
          "no dayplanrc; using defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Applies `key=value` overrides; a
  /// leading `rc.` is ignored.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .unwrap_or(&key);
      self.set(key, &value).with_context(
        || format!("in override {key}={value}")
      )?;
    }
    Ok(())
  }

  /// Sets one known key. Unknown keys are
  /// an error.
  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let value = value.trim();
    match key.trim() {
      | "data.location" => {
        if value.is_empty() {
          bail!(
            "data.location cannot be empty"
          );
        }
        self.data_location =
          Some(expand_tilde(value));
      }
      | "timezone" => {
        self.timezone = (!value
          .is_empty())
        .then(|| value.to_string());
      }
      | "store.timeout" => {
        self.store_timeout =
          parse_timeout(value)?;
      }
      | "color" => {
        self.color = parse_switch(value)
          .ok_or_else(|| {
            anyhow!(
              "color must be on or off, \
               got {value:?}"
            )
          })?;
      }
      | other => {
        bail!("unknown setting: {other}")
      }
    }
    debug!(key, value, "setting applied");
    Ok(())
  }

  #[tracing::instrument(skip(self))]
  fn read_rc(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let text = fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;

    for (idx, raw) in
      text.lines().enumerate()
    {
      let line = raw
        .split_once('#')
        .map_or(raw, |(before, _)| before)
        .trim();
      if line.is_empty() {
        continue;
      }

      let Some((key, value)) =
        line.split_once('=')
      else {
        bail!(
          "{}:{}: expected key = value",
          path.display(),
          idx + 1
        );
      };

      // Unknown keys are skipped so an rc
      // shared with a newer dayplan still
      // loads; bad values are not.
      if !KNOWN_KEYS.contains(&key.trim()) {
        warn!(
          file = %path.display(),
          line = idx + 1,
          key = key.trim(),
          "ignoring unknown setting"
        );
        continue;
      }
      self.set(key, value).with_context(
        || {
          format!(
            "{}:{}",
            path.display(),
            idx + 1
          )
        }
      )?;
    }

    self.source = Some(path.to_path_buf());
    Ok(())
  }
}

impl fmt::Display for Config {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match &self.data_location {
      | Some(dir) => writeln!(
        f,
        "data.location={}",
        dir.display()
      )?,
      | None => writeln!(
        f,
        "data.location=~/{DATA_DIR_NAME}"
      )?
    }
    writeln!(
      f,
      "timezone={}",
      self.timezone.as_deref().unwrap_or("")
    )?;
    writeln!(
      f,
      "store.timeout={}",
      self.store_timeout.as_millis()
    )?;
    writeln!(
      f,
      "color={}",
      if self.color { "on" } else { "off" }
    )?;
    if let Some(source) = &self.source {
      writeln!(
        f,
        "# loaded {}",
        source.display()
      )?;
    }
    Ok(())
  }
}

/// The data directory: `--data`, then
/// `data.location`, then `~/.dayplan`.
/// Created when missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    &cfg.data_location
  ) {
    | (Some(path), _) => {
      path.to_path_buf()
    }
    | (None, Some(path)) => path.clone(),
    | (None, None) => dirs::home_dir()
      .map(|home| home.join(DATA_DIR_NAME))
      .ok_or_else(|| {
        anyhow!(
          "cannot determine home \
           directory; set data.location"
        )
      })?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// `--dayplanrc`, then `$DAYPLANRC`
/// (`/dev/null` disables), then
/// `~/.dayplanrc` if it exists.
fn locate_rc(
  explicit: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = explicit {
    return Some(path.to_path_buf());
  }

  if let Ok(env_path) =
    std::env::var(RC_ENV_VAR)
  {
    return (env_path != "/dev/null")
      .then(|| PathBuf::from(env_path));
  }

  dirs::home_dir()
    .map(|home| home.join(RC_FILE_NAME))
    .filter(|path| path.exists())
}

fn parse_timeout(
  raw: &str
) -> anyhow::Result<Duration> {
  let millis: u64 =
    raw.parse().with_context(|| {
      format!(
        "store.timeout must be a whole \
         number of milliseconds, got \
         {raw:?}"
      )
    })?;
  if millis == 0 {
    bail!(
      "store.timeout must be greater \
       than zero"
    );
  }
  Ok(Duration::from_millis(millis))
}

fn parse_switch(raw: &str) -> Option<bool> {
  match raw.to_ascii_lowercase().as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Some(true)
    }
    | "off" | "no" | "false" | "0" => {
      Some(false)
    }
    | _ => None
  }
}

fn expand_tilde(raw: &str) -> PathBuf {
  if let Some(rest) =
    raw.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;
  use std::time::Duration;

  use pretty_assertions::assert_eq;
  use tempfile::tempdir;

  use super::{
    Config,
    resolve_data_dir
  };

  #[test]
  fn reads_known_keys_and_comments() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("dayplanrc");
    std::fs::write(
      &rc,
      "# planner settings\n\
       store.timeout = 250  # ms\n\
       timezone = Asia/Manila\n\
       color = off\n\
       \n\
       data.location = /srv/dayplan\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(
      rc.as_path()
    ))
    .expect("load config");
    assert_eq!(
      cfg,
      Config {
        data_location: Some(
          PathBuf::from("/srv/dayplan")
        ),
        timezone:      Some(
          "Asia/Manila".to_string()
        ),
        store_timeout: Duration::from_millis(
          250
        ),
        color:         false,
        source:        Some(rc)
      }
    );
  }

  #[test]
  fn unknown_rc_keys_are_skipped() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("dayplanrc");
    std::fs::write(
      &rc,
      "theme = dark\ncolor = no\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(
      rc.as_path()
    ))
    .expect("load config");
    assert!(!cfg.color);
  }

  #[test]
  fn bad_values_fail_with_location() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("dayplanrc");
    std::fs::write(
      &rc,
      "color = on\nstore.timeout = soon\n"
    )
    .expect("write rc");

    let err = Config::load(Some(
      rc.as_path()
    ))
    .expect_err("bad timeout");
    assert!(
      format!("{err:#}").contains(":2")
    );

    std::fs::write(&rc, "color on\n")
      .expect("write rc");
    assert!(
      Config::load(Some(rc.as_path()))
        .is_err()
    );
  }

  #[test]
  fn overrides_strip_rc_prefix_and_validate()
  {
    let mut cfg = Config::default();
    cfg
      .apply_overrides(vec![(
        "rc.color".to_string(),
        "off".to_string()
      )])
      .expect("override");
    assert!(!cfg.color);

    for (key, value) in [
      ("color", "sometimes"),
      ("store.timeout", "0"),
      ("colour", "on")
    ] {
      assert!(
        cfg
          .apply_overrides(vec![(
            key.to_string(),
            value.to_string()
          )])
          .is_err(),
        "{key}={value}"
      );
    }
  }

  #[test]
  fn data_flag_wins_and_is_created() {
    let temp =
      tempdir().expect("tempdir");
    let flagged =
      temp.path().join("from-flag");
    let mut cfg = Config::default();
    cfg
      .set(
        "data.location",
        &temp
          .path()
          .join("from-rc")
          .to_string_lossy()
      )
      .expect("set");

    let dir = resolve_data_dir(
      &cfg,
      Some(flagged.as_path())
    )
    .expect("resolve");
    assert_eq!(dir, flagged);
    assert!(flagged.is_dir());
    assert!(
      !temp.path().join("from-rc").exists()
    );
  }

  #[test]
  fn display_lists_every_setting() {
    let text = Config::default().to_string();
    assert_eq!(
      text,
      "data.location=~/.dayplan\n\
       timezone=\n\
       store.timeout=5000\n\
       color=on\n"
    );
  }
}
