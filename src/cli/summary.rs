use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};
use now::DateTimeNow;

use crate::{
    app::App,
    storage::{
        entities::{Client, FocusSession, Project, TimeEntry},
        record_storage::{Query, RecordStore},
    },
    utils::{
        clock::Clock,
        percentage::{duration_percentage, Percentage},
        time::{format_short, next_day_start},
    },
};

use super::{
    output::analysis::{analyze_entries, analyze_sessions, CategoryUsage, ProjectUsage},
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct SummaryCommand {
    #[arg(
        long,
        short,
        help = "Day to summarize. Examples are \"yesterday\", \"friday\", \"15/03/2025\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        short = 'p',
        long = "percentage",
        default_value_t = Percentage::ZERO,
        help = "Hide projects below this share of the day"
    )]
    min_share: Percentage,
}

#[derive(Debug)]
pub struct Summary {
    pub projects: Vec<ProjectUsage>,
    pub tracked: chrono::Duration,
    pub categories: Vec<CategoryUsage>,
    pub focused: chrono::Duration,
}

/// Prints tracked time and earnings per project and focused time per category for one local day.
pub async fn process_summary_command(
    app: &App,
    SummaryCommand {
        date,
        date_style,
        min_share,
    }: SummaryCommand,
) -> Result<()> {
    let day = match date.map(|s| parse_date_string(&s, Local::now(), date_style.into())) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {e}"),
                )
                .into());
        }
        None => Local::now(),
    };
    let start = day.beginning_of_day();
    let end = next_day_start(day);

    let summary = summarize(
        &app.records,
        start.with_timezone(&Utc),
        end.with_timezone(&Utc),
        min_share,
        app.clock.time(),
    )
    .await?;

    println!("{}", start.format("%x"));
    if summary.projects.is_empty() {
        println!("No tracked time");
    }
    for usage in &summary.projects {
        println!(
            "{}%\t{}\t{:.2}\t{}",
            *duration_percentage(usage.duration, summary.tracked) as i32,
            format_short(usage.duration),
            usage.earnings,
            usage.label
        );
    }
    if !summary.projects.is_empty() {
        let earned: f64 = summary.projects.iter().map(|u| u.earnings).sum();
        println!("Total\t{}\t{earned:.2}", format_short(summary.tracked));
    }

    if !summary.categories.is_empty() {
        println!();
        for usage in &summary.categories {
            println!(
                "{}%\t{}\t{} sessions\t{}",
                *duration_percentage(usage.duration, summary.focused) as i32,
                format_short(usage.duration),
                usage.sessions,
                usage.category
            );
        }
        println!("Focused\t{}", format_short(summary.focused));
    }
    Ok(())
}

/// Collects finished entries and sessions that started in `[start, end)`.
pub async fn summarize(
    records: &impl RecordStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_share: Percentage,
    now: DateTime<Utc>,
) -> Result<Summary> {
    let entries = records
        .fetch(
            Query::<TimeEntry>::all()
                .filter(move |e| !e.is_running() && e.start_time >= start && e.start_time < end),
        )
        .await?;
    let sessions = records
        .fetch(
            Query::<FocusSession>::all()
                .filter(move |s| !s.is_active() && s.start_time >= start && s.start_time < end),
        )
        .await?;
    let projects = records.fetch(Query::<Project>::all()).await?;
    let clients = records.fetch(Query::<Client>::all()).await?;

    let (projects, tracked) = analyze_entries(entries, &projects, &clients, min_share, now);
    let (categories, focused) = analyze_sessions(sessions, now);
    Ok(Summary {
        projects,
        tracked,
        categories,
        focused,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::Duration;
    use tempfile::tempdir;

    use crate::{
        app::App,
        storage::{
            entities::{Project, SessionType, TaskCategory},
            record_storage::RecordStore,
        },
        timer::focus::FocusTarget,
        utils::{
            clock::{testing::ManualClock, Clock},
            percentage::Percentage,
        },
    };

    use super::summarize;

    #[tokio::test]
    async fn test_summary_of_stopped_timers() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let mut app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let project = Project::new("Website".into(), 120., None, clock.time());
        app.records.insert(project.clone()).await?;

        let day_start = clock.time() - Duration::hours(9);
        app.billable.start(project, "").await;
        app.focus
            .start(FocusTarget::new(SessionType::Sprint, TaskCategory::Building), "")
            .await;
        clock.advance(Duration::minutes(30));
        app.billable.stop().await;
        app.focus.stop().await;

        // Still running, so not part of the summary yet.
        app.focus
            .start(FocusTarget::new(SessionType::Sprint, TaskCategory::Design), "")
            .await;
        clock.advance(Duration::minutes(5));

        let summary = summarize(
            &app.records,
            day_start,
            day_start + Duration::days(1),
            Percentage::ZERO,
            clock.time(),
        )
        .await?;
        assert_eq!(summary.tracked, Duration::minutes(30));
        assert_eq!(summary.projects.len(), 1);
        assert!((summary.projects[0].earnings - 60.).abs() < 1e-9);
        assert_eq!(summary.focused, Duration::minutes(30));
        assert_eq!(summary.categories[0].category, TaskCategory::Building);

        let tomorrow = summarize(
            &app.records,
            day_start + Duration::days(1),
            day_start + Duration::days(2),
            Percentage::ZERO,
            clock.time(),
        )
        .await?;
        assert!(tomorrow.projects.is_empty());
        assert!(tomorrow.categories.is_empty());
        Ok(())
    }
}
