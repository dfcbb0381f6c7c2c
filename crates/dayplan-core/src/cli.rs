use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::query::{CategoryFilter, StatusFilter};
use crate::task::Category;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dayplan",
    version,
    about = "Daily task planner: timeline, agenda and subtasks",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "dayplanrc")]
    pub dayplanrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Identifies the acting user by registered email.
#[derive(Args, Debug, Clone)]
pub struct UserArg {
    #[arg(long = "user", short = 'u')]
    pub email: String,
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    #[arg(long, default_value = "both")]
    pub category: CategoryFilter,

    #[arg(long, default_value = "both")]
    pub status: StatusFilter,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage user profiles.
    #[command(subcommand)]
    User(UserCommand),

    /// Create a task.
    Add(AddArgs),

    /// Create or update a task from a JSON payload (stdin by default).
    Upsert {
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List tasks matching the filters, by start time.
    List {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Timeline placement of one day's tasks.
    Day {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        date: String,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Tasks grouped by day.
    Agenda {
        #[command(flatten)]
        user: UserArg,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Monday-first week around a date (today when omitted).
    Week {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        date: Option<String>,
    },

    /// Completion summary for one day.
    Summary {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        date: String,
    },

    /// Mark a task done.
    Done {
        #[command(flatten)]
        user: UserArg,
        id: u64,
    },

    /// Mark a task pending again.
    Undone {
        #[command(flatten)]
        user: UserArg,
        id: u64,
    },

    /// Check or uncheck one subtask.
    Check {
        #[command(flatten)]
        user: UserArg,
        task_id: u64,
        subtask_id: u64,
        #[arg(long)]
        undone: bool,
    },

    /// Delete a task and its subtasks.
    Delete {
        #[command(flatten)]
        user: UserArg,
        id: u64,
    },

    /// Print matching tasks as JSON.
    Export {
        #[command(flatten)]
        user: UserArg,
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Show the effective configuration.
    Show,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[command(flatten)]
    pub user: UserArg,

    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long)]
    pub date: String,

    #[arg(long)]
    pub start: String,

    #[arg(long)]
    pub end: String,

    #[arg(long)]
    pub category: Category,

    #[arg(long = "subtask", action = ArgAction::Append)]
    pub subtasks: Vec<String>,

    #[arg(long)]
    pub done: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub age: u32,

    #[arg(long = "dob")]
    pub date_of_birth: String,

    #[arg(long = "phone")]
    pub phone_number: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Register a user.
    Add(ProfileArgs),

    /// Edit a user's profile.
    Edit {
        id: u64,
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// List registered users.
    List,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os(&["dayplan", "rc.color=off", "list", "rc.timezone:UTC"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, os(&["dayplan", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.timezone".to_string(), "UTC".to_string()),
            ]
        );
    }

    #[test]
    fn parses_add_with_repeated_subtasks() {
        let cli = GlobalCli::try_parse_from([
            "dayplan",
            "add",
            "--user",
            "ana@example.com",
            "--name",
            "Standup",
            "--date",
            "2024-10-20",
            "--start",
            "09:00",
            "--end",
            "09:15",
            "--category",
            "work",
            "--subtask",
            "notes",
            "--subtask",
            "follow up",
        ])
        .expect("parse");

        let Command::Add(args) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(args.category, Category::Work);
        assert_eq!(args.subtasks, vec!["notes".to_string(), "follow up".to_string()]);
    }

    #[test]
    fn filters_default_to_both() {
        let cli = GlobalCli::try_parse_from(["dayplan", "agenda", "-u", "ana@example.com"])
            .expect("parse");
        let Command::Agenda { filters, .. } = cli.command else {
            panic!("expected agenda command");
        };
        assert_eq!(filters.category, CategoryFilter::Both);
        assert_eq!(filters.status, StatusFilter::Both);
    }

    #[test]
    fn unknown_status_word_is_rejected() {
        let result = GlobalCli::try_parse_from([
            "dayplan", "list", "-u", "ana@example.com", "--status", "later",
        ]);
        assert!(result.is_err());
    }
}
