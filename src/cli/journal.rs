use anyhow::{bail, Result};
use chrono::{Local, NaiveDate};
use clap::Subcommand;
use tracing::info;

use crate::{
    app::App,
    storage::{
        entities::{DailyLog, EnergyPeriod, Reflection},
        record_storage::{Query, RecordStore},
    },
    utils::{
        clock::Clock,
        validation::{validate_rating, validate_text},
    },
};

use super::{entries::parse_local, summary::DateStyle};

#[derive(Subcommand, Debug)]
pub enum LogCommand {
    #[command(about = "Check in your energy for a part of the day, from 1 to 5")]
    Energy { period: EnergyPeriod, level: u8 },
    #[command(about = "Rate the day's mood from 1 to 5")]
    Mood { level: u8 },
    #[command(about = "Note a win of the day")]
    Win { text: String },
    #[command(about = "Note a challenge of the day")]
    Challenge { text: String },
    #[command(about = "Note something learned today")]
    Learning { text: String },
    #[command(about = "Remove a win, challenge or learning by its number from `log show`")]
    Remove { kind: Reflection, number: usize },
    #[command(about = "Replace the notes of the day")]
    Note { text: String },
    #[command(about = "Show the log of a day")]
    Show {
        #[arg(long, short, help = "Day to show, e.g. \"yesterday\". Defaults to today")]
        date: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk)]
        date_style: DateStyle,
    },
}

pub async fn process_log_command(app: &App, command: LogCommand) -> Result<()> {
    let today = app.clock.time().with_timezone(&Local).date_naive();
    if let LogCommand::Show { date, date_style } = command {
        let day = match date {
            Some(date) => parse_local(&date, app.clock.time(), date_style)?
                .with_timezone(&Local)
                .date_naive(),
            None => today,
        };
        let log = find_log(&app.records, day).await?;
        match log.filter(DailyLog::has_any_entry) {
            Some(log) => print!("{}", render_log(&log)),
            None => println!("Nothing logged on {day}"),
        }
        return Ok(());
    }

    let mut log = find_log(&app.records, today)
        .await?
        .unwrap_or_else(|| DailyLog::new(today));
    apply(&mut log, command)?;
    app.records.insert(log.clone()).await?;
    app.records.save().await?;
    info!("Updated daily log {:?}", log.id);
    print!("{}", render_log(&log));
    Ok(())
}

fn apply(log: &mut DailyLog, command: LogCommand) -> Result<()> {
    match command {
        LogCommand::Energy { period, level } => {
            *log.energy_mut(period) = Some(validate_rating("energy level", level)?);
        }
        LogCommand::Mood { level } => log.overall_mood = Some(validate_rating("mood", level)?),
        LogCommand::Win { text } => {
            log.add_reflection(Reflection::Win, validate_text("win", &text)?)
        }
        LogCommand::Challenge { text } => {
            log.add_reflection(Reflection::Challenge, validate_text("challenge", &text)?)
        }
        LogCommand::Learning { text } => {
            log.add_reflection(Reflection::Learning, validate_text("learning", &text)?)
        }
        LogCommand::Remove { kind, number } => {
            if number == 0 || log.remove_reflection(kind, number - 1).is_none() {
                bail!("There's no {kind:?} number {number}");
            }
        }
        LogCommand::Note { text } => {
            let text = text.trim();
            log.daily_notes = (!text.is_empty()).then(|| text.to_string());
        }
        LogCommand::Show { .. } => {}
    }
    Ok(())
}

pub async fn find_log(records: &impl RecordStore, date: NaiveDate) -> Result<Option<DailyLog>> {
    Ok(records
        .fetch(Query::<DailyLog>::all().filter(move |l| l.date == date).limit(1))
        .await?
        .into_iter()
        .next())
}

fn render_log(log: &DailyLog) -> String {
    let level = |v: Option<u8>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
    let mut out = format!(
        "{}\nEnergy\t{} / {} / {}",
        log.date,
        level(log.morning_energy),
        level(log.afternoon_energy),
        level(log.evening_energy)
    );
    if let Some(average) = log.average_energy() {
        out += &format!("\taverage {average:.1}");
    }
    out += &format!("\nMood\t{}\n", level(log.overall_mood));
    for (kind, title) in [
        (Reflection::Win, "Wins"),
        (Reflection::Challenge, "Challenges"),
        (Reflection::Learning, "Learnings"),
    ] {
        let items = log.reflections(kind);
        if items.is_empty() {
            continue;
        }
        out += &format!("{title}\n");
        for (i, item) in items.iter().enumerate() {
            out += &format!("  {}. {item}\n", i + 1);
        }
    }
    if let Some(notes) = &log.daily_notes {
        out += &format!("Notes\t{notes}\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{Duration, Local};
    use tempfile::tempdir;

    use crate::{
        app::App,
        storage::entities::{EnergyPeriod, Reflection},
        utils::clock::{testing::ManualClock, Clock},
    };

    use super::{find_log, process_log_command, render_log, LogCommand};

    #[tokio::test]
    async fn test_log_builds_one_entry_per_day() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let app = App::open(dir.path(), Arc::new(clock.clone())).await?;
        let today = clock.time().with_timezone(&Local).date_naive();

        for command in [
            LogCommand::Energy {
                period: EnergyPeriod::Morning,
                level: 4,
            },
            LogCommand::Energy {
                period: EnergyPeriod::Afternoon,
                level: 3,
            },
            LogCommand::Mood { level: 5 },
            LogCommand::Win {
                text: "Shipped the beta".into(),
            },
            LogCommand::Win {
                text: "Inbox zero".into(),
            },
            LogCommand::Learning {
                text: "Rust lifetimes".into(),
            },
            LogCommand::Remove {
                kind: Reflection::Win,
                number: 1,
            },
            LogCommand::Note {
                text: " good day ".into(),
            },
        ] {
            process_log_command(&app, command).await?;
        }

        let log = find_log(&app.records, today)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No log for today"))?;
        assert_eq!(log.average_energy(), Some(3.5));
        assert_eq!(log.overall_mood, Some(5));
        assert_eq!(log.wins, vec!["Inbox zero".to_string()]);
        assert_eq!(log.learnings.len(), 1);
        assert_eq!(log.daily_notes.as_deref(), Some("good day"));

        let rendered = render_log(&log);
        assert!(rendered.contains("average 3.5"));
        assert!(rendered.contains("  1. Inbox zero"));

        clock.advance(Duration::days(1));
        process_log_command(&app, LogCommand::Mood { level: 2 }).await?;
        let tomorrow = today + Duration::days(1);
        assert_eq!(
            find_log(&app.records, tomorrow).await?.and_then(|l| l.overall_mood),
            Some(2)
        );
        assert_eq!(
            find_log(&app.records, today).await?.and_then(|l| l.overall_mood),
            Some(5)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_check_in_changes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let clock = ManualClock::new();
        let app = App::open(dir.path(), Arc::new(clock.clone())).await?;

        let result = process_log_command(
            &app,
            LogCommand::Energy {
                period: EnergyPeriod::Evening,
                level: 6,
            },
        )
        .await;
        assert!(result.is_err());
        assert!(process_log_command(&app, LogCommand::Win { text: " ".into() })
            .await
            .is_err());
        let missing = LogCommand::Remove {
            kind: Reflection::Challenge,
            number: 1,
        };
        assert!(process_log_command(&app, missing).await.is_err());

        let today = clock.time().with_timezone(&Local).date_naive();
        assert_eq!(find_log(&app.records, today).await?, None);
        Ok(())
    }
}
