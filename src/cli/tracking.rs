use anyhow::{bail, Result};
use chrono::Local;
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use crate::{
    app::{App, Records},
    storage::{
        entities::{Project, SessionType, TaskCategory, TimeEntry},
        record_storage::{Query, RecordStore},
    },
    timer::{
        billable::Billable,
        engine::TimerEngine,
        focus::{Focus, FocusTarget},
        state::TimerStatus,
        tracking::Tracking,
    },
    utils::{
        clock::Clock,
        time::{as_hours, format_elapsed, format_short},
        validation::validate_notes,
    },
};

use super::{
    entries::{
        add_entry, edit_entry, entry_end, parse_local, recent_entries, resolve_entry,
        EntryChanges,
    },
    lookup::short_id,
    projects::resolve_project,
    summary::DateStyle,
    watch::{detect_interrupt, status_line, watch_status},
};

#[derive(Subcommand, Debug)]
pub enum TimerCommand {
    #[command(about = "Start tracking a project. A running timer is stopped first")]
    Start {
        #[arg(help = "Project name or id prefix")]
        project: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    #[command(about = "Pause the running timer")]
    Pause,
    #[command(about = "Resume the paused timer")]
    Resume,
    #[command(about = "Stop the timer and save the time entry")]
    Stop,
    #[command(about = "Show the timer")]
    Status,
    #[command(about = "Show the timer until it stops or Ctrl-C is pressed")]
    Watch,
    #[command(about = "Replace the notes of the running timer")]
    Notes { text: String },
    #[command(about = "Add a finished time entry, given its end or its length")]
    Add {
        #[arg(help = "Project name or id prefix")]
        project: String,
        #[arg(long, help = "When the work started, e.g. \"today 9:00\" or \"2025-11-06 14:30\"")]
        start: String,
        #[arg(long, required_unless_present = "minutes", conflicts_with = "minutes")]
        end: Option<String>,
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(1..=1440),
            help = "Length in minutes"
        )]
        minutes: Option<u32>,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
    },
    #[command(about = "List time entries, newest first")]
    Entries {
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },
    #[command(about = "Change a time entry")]
    Edit {
        #[arg(help = "Entry id prefix, see `timer entries`")]
        entry: String,
        #[arg(long, help = "Move the entry to another project")]
        project: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk)]
        date_style: DateStyle,
    },
    #[command(about = "Delete a time entry")]
    Delete {
        #[arg(help = "Entry id prefix, see `timer entries`")]
        entry: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum FocusCommand {
    #[command(about = "Start a focus session. A running session is stopped first")]
    Start {
        #[arg(help = "Defaults to default_session_type from config.toml")]
        session_type: Option<SessionType>,
        #[arg(help = "Defaults to default_category from config.toml")]
        category: Option<TaskCategory>,
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(1..=1440),
            help = "Planned length in minutes. Defaults to the length of the session type"
        )]
        minutes: Option<u32>,
        #[arg(long, help = "What the session is about")]
        task: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    #[command(about = "Pause the running session")]
    Pause,
    #[command(about = "Resume the paused session")]
    Resume,
    #[command(about = "Finish the session, optionally rating it")]
    Stop {
        #[arg(long, help = "Focus quality from 1 to 5")]
        quality: Option<u8>,
        #[arg(long, help = "Energy level from 1 to 5")]
        energy: Option<u8>,
    },
    #[command(about = "Show the session")]
    Status,
    #[command(about = "Show the session until it stops or Ctrl-C is pressed")]
    Watch,
    #[command(about = "Count an interruption of the running session")]
    Interrupt,
    #[command(about = "Replace the notes of the running session")]
    Notes { text: String },
}

pub async fn process_timer_command(app: &mut App, command: TimerCommand) -> Result<()> {
    let engine = &mut app.billable;
    match command {
        TimerCommand::Start { project, notes } => {
            let notes = validate_notes(&notes)?;
            let project = resolve_project(engine.records(), &project).await?;
            if project.is_archived {
                bail!("Project {} is archived", project.name);
            }
            engine.start(project, &notes).await;
            println!("{}", billable_line(engine));
        }
        TimerCommand::Pause => {
            engine.pause().await;
            println!("{}", billable_line(engine));
        }
        TimerCommand::Resume => {
            engine.resume().await;
            println!("{}", billable_line(engine));
        }
        TimerCommand::Stop => {
            let Some(project) = engine.current_target().cloned() else {
                println!("No timer is running");
                return Ok(());
            };
            match engine.stop().await {
                Some(entry) => {
                    let now = app.clock.time();
                    println!(
                        "Tracked {} on {}, earned {:.2}",
                        format_elapsed(entry.duration(now)),
                        project.name,
                        entry.earnings(project.hourly_rate, now)
                    );
                }
                None => println!("{} no longer exists, the entry was discarded", project.name),
            }
        }
        TimerCommand::Status => println!("{}", billable_line(engine)),
        TimerCommand::Watch => {
            let rate = engine.current_target().map(|p| p.hourly_rate).unwrap_or(0.);
            follow(engine, app.config.refresh_interval(), move |status| {
                format!(
                    "{}\t{:.2}",
                    status_line(status),
                    as_hours(status.elapsed) * rate
                )
            })
            .await?;
        }
        TimerCommand::Notes { text } => {
            let notes = validate_notes(&text)?;
            if !engine.is_tracking() {
                println!("No timer is running");
                return Ok(());
            }
            engine.update_notes(&notes).await;
            println!("{}", billable_line(engine));
        }
        TimerCommand::Add {
            project,
            start,
            end,
            minutes,
            notes,
            date_style,
        } => {
            let notes = validate_notes(&notes)?;
            let now = app.clock.time();
            let project = resolve_project(&app.records, &project).await?;
            if project.is_archived {
                bail!("Project {} is archived", project.name);
            }
            let start = parse_local(&start, now, date_style)?;
            let end = end
                .map(|end| parse_local(&end, now, date_style))
                .transpose()?;
            let end = entry_end(start, end, minutes)?;

            let entry = add_entry(&app.records, &project, start, end, notes, now).await?;
            println!(
                "Added {} on {}, earned {:.2}",
                format_elapsed(entry.duration(now)),
                project.name,
                entry.earnings(project.hourly_rate, now)
            );
        }
        TimerCommand::Entries { limit } => {
            let now = app.clock.time();
            let projects = app
                .records
                .fetch(Query::<Project>::all())
                .await?;
            for entry in recent_entries(&app.records, limit).await? {
                let project = projects.iter().find(|p| p.id == entry.project_id);
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    short_id(entry.id),
                    entry.start_time.with_timezone(&Local).format("%x %H:%M"),
                    format_short(entry.duration(now)),
                    project.map(|p| p.name.as_str()).unwrap_or("Deleted project"),
                    entry.notes
                );
            }
        }
        TimerCommand::Edit {
            entry,
            project,
            start,
            end,
            notes,
            date_style,
        } => {
            let now = app.clock.time();
            let entry = resolve_entry(&app.records, &entry).await?;
            let changes = EntryChanges {
                project: match project {
                    Some(project) => Some(resolve_project(&app.records, &project).await?),
                    None => None,
                },
                start: start
                    .map(|start| parse_local(&start, now, date_style))
                    .transpose()?,
                end: end.map(|end| parse_local(&end, now, date_style)).transpose()?,
                notes: notes.map(|notes| validate_notes(&notes)).transpose()?,
            };
            let entry = edit_entry(&app.records, entry, changes).await?;
            println!(
                "Updated {}\t{}",
                short_id(entry.id),
                format_short(entry.duration(now))
            );
        }
        TimerCommand::Delete { entry } => {
            let entry = resolve_entry(&app.records, &entry).await?;
            app.records.delete::<TimeEntry>(entry.id).await?;
            app.records.save().await?;
            println!("Deleted entry {}", short_id(entry.id));
        }
    }
    Ok(())
}

pub async fn process_focus_command(app: &mut App, command: FocusCommand) -> Result<()> {
    let engine = &mut app.focus;
    match command {
        FocusCommand::Start {
            session_type,
            category,
            minutes,
            task,
            notes,
        } => {
            let notes = validate_notes(&notes)?;
            let target = FocusTarget::new(
                session_type.unwrap_or(app.config.default_session_type),
                category.unwrap_or(app.config.default_category),
            )
            .with_task(task);
            let target = match minutes {
                Some(minutes) => {
                    target.with_planned_duration(chrono::Duration::minutes(minutes.into()))
                }
                None => target,
            };
            engine.start(target, &notes).await;
            println!("{}", focus_line(engine));
        }
        FocusCommand::Pause => {
            engine.pause().await;
            println!("{}", focus_line(engine));
        }
        FocusCommand::Resume => {
            engine.resume().await;
            println!("{}", focus_line(engine));
        }
        FocusCommand::Stop { quality, energy } => {
            if !engine.is_tracking() {
                println!("No focus session is running");
                return Ok(());
            }
            if let Some(session) = engine.stop_with_reflection(quality, energy).await? {
                println!(
                    "Focused {} of planned {} with {} interruptions",
                    format_elapsed(session.actual_duration(app.clock.time())),
                    format_elapsed(session.planned_duration),
                    session.interruption_count
                );
            }
        }
        FocusCommand::Status => println!("{}", focus_line(engine)),
        FocusCommand::Watch => {
            follow(engine, app.config.refresh_interval(), |status| {
                let remaining = status
                    .planned
                    .map(|planned| (planned - status.elapsed).max(chrono::Duration::zero()))
                    .unwrap_or_else(chrono::Duration::zero);
                format!("{}\t{} left", status_line(status), format_elapsed(remaining))
            })
            .await?;
        }
        FocusCommand::Interrupt => {
            if engine.record_interruption().await {
                println!("{} interruptions so far", engine.interruptions());
            } else {
                println!("No focus session is running");
            }
        }
        FocusCommand::Notes { text } => {
            let notes = validate_notes(&text)?;
            if !engine.is_tracking() {
                println!("No focus session is running");
                return Ok(());
            }
            engine.update_notes(&notes).await;
            println!("{}", focus_line(engine));
        }
    }
    Ok(())
}

fn billable_line(engine: &TimerEngine<Billable, Records>) -> String {
    let line = status_line(&engine.status());
    if !engine.is_tracking() {
        return line;
    }
    format!("{line}\t{:.2}", engine.current_earnings())
}

fn focus_line(engine: &TimerEngine<Focus, Records>) -> String {
    let line = status_line(&engine.status());
    match (engine.remaining(), engine.progress()) {
        (Some(remaining), Some(progress)) => format!(
            "{line}\t{} left\t{:.0}%\t{} interruptions",
            format_elapsed(remaining),
            progress * 100.,
            engine.interruptions()
        ),
        _ => line,
    }
}

async fn follow<T: Tracking>(
    engine: &mut TimerEngine<T, Records>,
    sync_interval: std::time::Duration,
    render: impl FnMut(&TimerStatus) -> String,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(detect_interrupt(cancel.clone()));
    let result = watch_status(
        engine,
        cancel,
        sync_interval,
        &mut std::io::stdout(),
        render,
    )
    .await;
    interrupt.abort();
    result
}
