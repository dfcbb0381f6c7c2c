use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, Command, FilterArgs, ProfileArgs, UserArg, UserCommand};
use crate::config::Config;
use crate::datastore::TaskStore;
use crate::datetime::{parse_calendar_date, to_local_date};
use crate::query::TaskQuery;
use crate::render::Renderer;
use crate::service::Planner;
use crate::summary::WeekStrip;
use crate::task::DesiredSubtask;
use crate::upsert::{TaskUpsert, UpsertOutcome};
use crate::user::UserUpsert;

#[instrument(skip(planner, cfg, renderer, command))]
pub fn dispatch<S: TaskStore>(
    planner: &Planner<S>,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::User(sub) => cmd_user(planner, renderer, sub),
        Command::Add(args) => cmd_add(planner, args),
        Command::Upsert { file } => cmd_upsert(planner, file.as_deref()),
        Command::List {
            user,
            date,
            filters,
        } => {
            let query = build_query(planner, &user, date.as_deref(), &filters)?;
            renderer.print_task_table(&planner.list(&query)?)
        }
        Command::Day {
            user,
            date,
            filters,
        } => {
            let day = parse_calendar_date(&date)?;
            let query = build_query(planner, &user, None, &filters)?;
            let entries = planner.day_layout(&query, day)?;
            if entries.is_empty() {
                println!("No tasks on {}.", day.format("%Y-%m-%d"));
                return Ok(());
            }
            renderer.print_timeline(&entries)
        }
        Command::Agenda { user, filters } => {
            let query = build_query(planner, &user, None, &filters)?;
            renderer.print_agenda(&planner.agenda(&query)?)
        }
        Command::Week { user, date } => cmd_week(planner, renderer, &user, date.as_deref()),
        Command::Summary { user, date } => {
            let owner = planner.resolve_user(&user.email)?;
            let day = parse_calendar_date(&date)?;
            renderer.print_summary(&planner.summary(owner.id, day)?)
        }
        Command::Done { user, id } => cmd_set_completed(planner, &user, id, true),
        Command::Undone { user, id } => cmd_set_completed(planner, &user, id, false),
        Command::Check {
            user,
            task_id,
            subtask_id,
            undone,
        } => {
            let owner = planner.resolve_user(&user.email)?;
            let task = planner.set_subtask_completed(owner.id, task_id, subtask_id, !undone)?;
            println!(
                "Task {}: {}/{} subtasks done.",
                task.id,
                task.completed_subtasks(),
                task.subtasks.len()
            );
            Ok(())
        }
        Command::Delete { user, id } => {
            let owner = planner.resolve_user(&user.email)?;
            let task = planner.delete_task(owner.id, id)?;
            println!("Deleted task {} '{}'.", task.id, task.name);
            Ok(())
        }
        Command::Export {
            user,
            date,
            filters,
        } => {
            let query = build_query(planner, &user, date.as_deref(), &filters)?;
            let out = serde_json::to_string(&planner.list(&query)?)?;
            println!("{out}");
            Ok(())
        }
        Command::Show => cmd_show(cfg),
    }
}

fn build_query<S: TaskStore>(
    planner: &Planner<S>,
    user: &UserArg,
    date: Option<&str>,
    filters: &FilterArgs,
) -> anyhow::Result<TaskQuery> {
    let owner = planner.resolve_user(&user.email)?;
    let mut query = TaskQuery::for_user(owner.id)
        .category(filters.category)
        .status(filters.status);
    if let Some(raw) = date {
        query = query.on(parse_calendar_date(raw)?);
    }
    debug!(?query, "built task query");
    Ok(query)
}

#[instrument(skip(planner, renderer, sub))]
fn cmd_user<S: TaskStore>(
    planner: &Planner<S>,
    renderer: &Renderer,
    sub: UserCommand,
) -> anyhow::Result<()> {
    match sub {
        UserCommand::Add(profile) => {
            let user = planner.upsert_user(profile_upsert(None, profile)?)?;
            info!(id = user.id, "user registered");
            println!("Registered user {} <{}>.", user.id, user.email);
            Ok(())
        }
        UserCommand::Edit { id, profile } => {
            let user = planner.upsert_user(profile_upsert(Some(id), profile)?)?;
            println!("Updated user {}.", user.id);
            Ok(())
        }
        UserCommand::List => renderer.print_users(&planner.users()?),
    }
}

fn profile_upsert(id: Option<u64>, profile: ProfileArgs) -> anyhow::Result<UserUpsert> {
    Ok(UserUpsert {
        id,
        name: profile.name,
        email: profile.email,
        age: profile.age,
        date_of_birth: parse_calendar_date(&profile.date_of_birth)?,
        phone_number: profile.phone_number,
    })
}

#[instrument(skip(planner, args))]
fn cmd_add<S: TaskStore>(planner: &Planner<S>, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let owner = planner.resolve_user(&args.user.email)?;
    let subtasks = args
        .subtasks
        .into_iter()
        .map(DesiredSubtask::new)
        .collect::<Vec<_>>();

    let outcome = planner.upsert_task(TaskUpsert {
        id: None,
        owner_id: owner.id,
        name: args.name,
        description: args.description,
        date: args.date,
        start: args.start,
        end: args.end,
        category: args.category,
        completed: args.done.then_some(true),
        subtasks: Some(subtasks),
    })?;

    report_outcome(&outcome);
    Ok(())
}

#[instrument(skip(planner))]
fn cmd_upsert<S: TaskStore>(planner: &Planner<S>, file: Option<&Path>) -> anyhow::Result<()> {
    info!("command upsert");

    let raw = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read upsert payload from stdin")?;
            buf
        }
    };

    let upsert: TaskUpsert =
        serde_json::from_str(raw.trim()).context("invalid upsert payload")?;
    let outcome = planner.upsert_task(upsert)?;
    report_outcome(&outcome);
    Ok(())
}

fn report_outcome(outcome: &UpsertOutcome) {
    if outcome.created {
        println!("Created task {}.", outcome.task.id);
        return;
    }

    match &outcome.plan {
        Some(plan) => println!(
            "Updated task {} (subtasks: {} created, {} updated, {} deleted).",
            outcome.task.id,
            plan.to_create.len(),
            plan.to_update.len(),
            plan.to_delete.len()
        ),
        None => println!("Updated task {}.", outcome.task.id),
    }
}

fn cmd_set_completed<S: TaskStore>(
    planner: &Planner<S>,
    user: &UserArg,
    id: u64,
    completed: bool,
) -> anyhow::Result<()> {
    let owner = planner.resolve_user(&user.email)?;
    let task = planner.set_completed(owner.id, id, completed)?;
    let state = if task.completed { "done" } else { "pending" };
    println!("Task {} is {state}.", task.id);
    Ok(())
}

#[instrument(skip(planner, renderer, user))]
fn cmd_week<S: TaskStore>(
    planner: &Planner<S>,
    renderer: &Renderer,
    user: &UserArg,
    date: Option<&str>,
) -> anyhow::Result<()> {
    let owner = planner.resolve_user(&user.email)?;
    let anchor: NaiveDate = match date {
        Some(raw) => parse_calendar_date(raw)?,
        None => to_local_date(Utc::now(), planner.timezone()),
    };

    renderer.print_week(&planner.week(owner.id, anchor)?)?;
    println!(
        "previous: {}  next: {}",
        WeekStrip::previous_anchor(anchor).format("%Y-%m-%d"),
        WeekStrip::next_anchor(anchor).format("%Y-%m-%d")
    );
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    print!("{cfg}");
    Ok(())
}
