use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Subcommand;
use now::DateTimeNow;
use tracing::info;

use crate::{
    app::App,
    storage::{
        entities::{TaskCategory, TaskItem, TaskPriority},
        record_storage::{Query, RecordStore},
    },
    utils::{
        clock::Clock,
        time::format_short,
        validation::{validate_name, validate_notes},
    },
};

use super::lookup::{by_id_prefix, short_id};

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    #[command(about = "Add a task")]
    Add {
        title: String,
        #[arg(long, help = "Defaults to default_category from config.toml")]
        category: Option<TaskCategory>,
        #[arg(long, value_enum, default_value_t = TaskPriority::ShouldDo)]
        priority: TaskPriority,
        #[arg(long, help = "Estimated minutes")]
        estimate: Option<u32>,
        #[arg(long, help = "Make the task one of today's intentions")]
        intention: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "List open tasks, most important first")]
    List {
        #[arg(long, help = "Include completed tasks")]
        all: bool,
        #[arg(long, help = "Only daily intentions")]
        intentions: bool,
    },
    #[command(about = "Mark a task as done")]
    Done {
        #[arg(help = "Task title or id prefix")]
        task: String,
        #[arg(long, help = "Minutes the task actually took")]
        actual: Option<u32>,
    },
    #[command(about = "Mark a done task as open again")]
    Undo {
        #[arg(help = "Task title or id prefix")]
        task: String,
    },
    #[command(about = "Delete a task")]
    Delete {
        #[arg(help = "Task title or id prefix")]
        task: String,
    },
}

pub async fn process_task_command(app: &App, command: TaskCommand) -> Result<()> {
    let now = app.clock.time();
    match command {
        TaskCommand::Add {
            title,
            category,
            priority,
            estimate,
            intention,
            notes,
        } => {
            let title = validate_name("task title", &title)?;
            let mut task = TaskItem::new(
                title,
                category.unwrap_or(app.config.default_category),
                priority,
                now,
            );
            task.estimated_minutes = estimate;
            task.is_daily_intention = intention;
            task.notes = notes
                .map(|n| validate_notes(&n))
                .transpose()?
                .filter(|n| !n.is_empty());

            app.records.insert(task.clone()).await?;
            app.records.save().await?;
            info!("Added task {:?}", task.id);
            println!("Added {}", task_line(&task, today_start(now)));
        }
        TaskCommand::List { all, intentions } => {
            let today = today_start(now);
            for task in list_tasks(&app.records, all, intentions).await? {
                println!("{}", task_line(&task, today));
            }
        }
        TaskCommand::Done { task, actual } => {
            let mut task = resolve_task(&app.records, &task).await?;
            task.complete(now, actual);
            app.records.insert(task.clone()).await?;
            app.records.save().await?;
            match task.time_variance() {
                Some(0) => println!("Done {}, right on estimate", task.title),
                Some(v) if v > 0 => println!("Done {}, {v} min over estimate", task.title),
                Some(v) => println!("Done {}, {} min under estimate", task.title, -v),
                None => println!("Done {}", task.title),
            }
        }
        TaskCommand::Undo { task } => {
            let mut task = resolve_task(&app.records, &task).await?;
            task.uncomplete();
            app.records.insert(task.clone()).await?;
            app.records.save().await?;
            println!("Reopened {}", task.title);
        }
        TaskCommand::Delete { task } => {
            let task = resolve_task(&app.records, &task).await?;
            app.records.delete::<TaskItem>(task.id).await?;
            app.records.save().await?;
            println!("Deleted {}", task.title);
        }
    }
    Ok(())
}

/// Open tasks come first, then by priority and age.
pub async fn list_tasks(
    records: &impl RecordStore,
    all: bool,
    intentions: bool,
) -> Result<Vec<TaskItem>> {
    records
        .fetch(
            Query::<TaskItem>::all()
                .filter(move |t| all || !t.is_completed)
                .filter(move |t| !intentions || t.is_daily_intention)
                .sort_by(|a, b| {
                    a.is_completed
                        .cmp(&b.is_completed)
                        .then(a.priority.cmp(&b.priority))
                        .then(a.created_at.cmp(&b.created_at))
                }),
        )
        .await
}

/// Finds a task by its title (case insensitive) or by a unique prefix of its id. Open tasks win
/// over completed ones with the same title.
pub async fn resolve_task(records: &impl RecordStore, query: &str) -> Result<TaskItem> {
    let wanted = query.trim().to_lowercase();
    let tasks = records.fetch(Query::<TaskItem>::all()).await?;
    let mut named = tasks
        .iter()
        .filter(|t| t.title.to_lowercase() == wanted)
        .collect::<Vec<_>>();
    named.sort_by_key(|t| t.is_completed);
    if let Some(task) = named.first() {
        return Ok((*task).clone());
    }
    by_id_prefix(tasks, query, "task")
}

fn today_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_timezone(&Local)
        .beginning_of_day()
        .with_timezone(&Utc)
}

fn task_line(task: &TaskItem, today_start: DateTime<Utc>) -> String {
    let mut line = format!(
        "{}\t[{}]\t{}\t{}\t{}",
        short_id(task.id),
        if task.is_completed { "x" } else { " " },
        task.priority,
        task.category,
        task.title
    );
    if let Some(estimate) = task.estimated_minutes {
        line += &format!(
            "\t~{}",
            format_short(chrono::Duration::minutes(estimate.into()))
        );
    }
    if task.is_daily_intention {
        line += "\tintention";
    }
    if task.is_overdue(today_start) {
        line += "\toverdue";
    }
    line
}
