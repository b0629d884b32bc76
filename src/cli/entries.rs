use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use chrono_english::parse_date_string;
use clap::CommandFactory;
use tracing::info;

use crate::{
    storage::{
        entities::{Project, TimeEntry},
        record_storage::{Query, RecordStore},
    },
    utils::validation::validate_interval,
};

use super::{lookup::by_id_prefix, summary::DateStyle, Args};

/// Parses moments like "today 9:00", "yesterday 14:30" or "2025-11-06 17:00" relative to `base`.
pub fn parse_moment<Tz: TimeZone>(
    text: &str,
    base: DateTime<Tz>,
    date_style: DateStyle,
) -> Result<DateTime<Utc>>
where
    Tz::Offset: Copy,
{
    match parse_date_string(text, base, date_style.into()) {
        Ok(moment) => Ok(moment.with_timezone(&Utc)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to parse {text:?} {e}"),
            )
            .into()),
    }
}

/// Moment given on the command line, interpreted in local time.
pub fn parse_local(text: &str, now: DateTime<Utc>, date_style: DateStyle) -> Result<DateTime<Utc>> {
    parse_moment(text, now.with_timezone(&Local), date_style)
}

/// End of a manual entry, either given directly or as a length in minutes.
pub fn entry_end(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    minutes: Option<u32>,
) -> Result<DateTime<Utc>> {
    match (end, minutes) {
        (Some(end), _) => Ok(end),
        (None, Some(minutes)) if minutes > 0 => Ok(start + Duration::minutes(minutes.into())),
        _ => bail!("Either an end time or a positive length is needed"),
    }
}

/// Stores a finished entry and marks the project as used.
pub async fn add_entry(
    records: &impl RecordStore,
    project: &Project,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    notes: String,
    now: DateTime<Utc>,
) -> Result<TimeEntry> {
    validate_interval(start, end)?;
    let entry = TimeEntry::finished(project.id, start, end, notes);
    records.insert(entry.clone()).await?;
    if let Some(mut stored) = records.get::<Project>(project.id).await? {
        stored.last_used_at = now;
        records.insert(stored).await?;
    }
    records.save().await?;
    info!("Added entry {:?} to {:?}", entry.id, project.id);
    Ok(entry)
}

#[derive(Debug, Default)]
pub struct EntryChanges {
    pub project: Option<Project>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Changing the interval drops the worked time recorded for a paused timer, the new interval
/// is taken as is.
pub async fn edit_entry(
    records: &impl RecordStore,
    mut entry: TimeEntry,
    changes: EntryChanges,
) -> Result<TimeEntry> {
    let Some(end) = changes.end.or(entry.end_time) else {
        bail!("Entry {} is still running", entry.id);
    };
    let start = changes.start.unwrap_or(entry.start_time);
    validate_interval(start, end)?;

    if changes.start.is_some() || changes.end.is_some() {
        entry.manual_duration = None;
    }
    entry.start_time = start;
    entry.end_time = Some(end);
    if let Some(project) = changes.project {
        entry.project_id = project.id;
    }
    if let Some(notes) = changes.notes {
        entry.notes = notes;
    }

    records.insert(entry.clone()).await?;
    records.save().await?;
    info!("Updated entry {:?}", entry.id);
    Ok(entry)
}

pub async fn resolve_entry(records: &impl RecordStore, prefix: &str) -> Result<TimeEntry> {
    by_id_prefix(records.fetch(Query::<TimeEntry>::all()).await?, prefix, "entry")
}

pub async fn recent_entries(records: &impl RecordStore, limit: usize) -> Result<Vec<TimeEntry>> {
    records
        .fetch(
            Query::<TimeEntry>::all()
                .sort_by(|a, b| b.start_time.cmp(&a.start_time))
                .limit(limit),
        )
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        cli::summary::DateStyle,
        storage::{
            entities::{Project, TimeEntry},
            record_storage::{JsonRecordStore, Query, RecordStore},
        },
        utils::validation::ValidationError,
    };

    use super::{add_entry, edit_entry, entry_end, parse_moment, recent_entries, EntryChanges};

    #[test]
    fn test_parse_moment() -> Result<()> {
        let base = Utc.with_ymd_and_hms(2025, 11, 6, 12, 0, 0).unwrap();
        assert_eq!(
            parse_moment("2025-11-05 14:30", base, DateStyle::Uk)?,
            Utc.with_ymd_and_hms(2025, 11, 5, 14, 30, 0).unwrap()
        );
        assert_eq!(
            parse_moment("03/11/2025 10:00", base, DateStyle::Us)?,
            Utc.with_ymd_and_hms(2025, 3, 11, 10, 0, 0).unwrap()
        );
        assert!(parse_moment("whenever", base, DateStyle::Uk).is_err());
        Ok(())
    }

    #[test]
    fn test_entry_end() -> Result<()> {
        let start = Utc.with_ymd_and_hms(2025, 11, 6, 9, 0, 0).unwrap();
        assert_eq!(entry_end(start, None, Some(90))?, start + Duration::minutes(90));
        assert_eq!(
            entry_end(start, Some(start + Duration::hours(1)), None)?,
            start + Duration::hours(1)
        );
        assert!(entry_end(start, None, Some(0)).is_err());
        assert!(entry_end(start, None, None).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_add_and_edit_entry() -> Result<()> {
        let dir = tempdir()?;
        let records = Arc::new(JsonRecordStore::new(dir.path().to_owned())?);
        let created = Utc.with_ymd_and_hms(2025, 11, 1, 9, 0, 0).unwrap();
        let website = Project::new("Website".into(), 100., None, created);
        let blog = Project::new("Blog".into(), 50., None, created);
        records.insert(website.clone()).await?;
        records.insert(blog.clone()).await?;

        let start = Utc.with_ymd_and_hms(2025, 11, 6, 9, 0, 0).unwrap();
        let now = start + Duration::hours(8);
        let invalid = add_entry(&records, &website, start, start, "".into(), now).await;
        assert_eq!(
            invalid.err().and_then(|e| e.downcast::<ValidationError>().ok()),
            Some(ValidationError::Interval { start, end: start })
        );

        let entry = add_entry(
            &records,
            &website,
            start,
            start + Duration::hours(2),
            "wireframes".into(),
            now,
        )
        .await?;
        assert_eq!(entry.duration(now), Duration::hours(2));
        assert_eq!(
            records.get::<Project>(website.id).await?.map(|p| p.last_used_at),
            Some(now)
        );

        let mut paused = entry.clone();
        paused.manual_duration = Some(Duration::minutes(90));
        let edited = edit_entry(
            &records,
            paused,
            EntryChanges {
                project: Some(blog.clone()),
                end: Some(start + Duration::hours(3)),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(edited.project_id, blog.id);
        assert_eq!(edited.notes, "wireframes");
        assert_eq!(edited.manual_duration, None);
        assert_eq!(edited.duration(now), Duration::hours(3));

        let backwards = edit_entry(
            &records,
            edited.clone(),
            EntryChanges {
                start: Some(start + Duration::hours(4)),
                ..Default::default()
            },
        )
        .await;
        assert!(backwards.is_err());

        let reopened = JsonRecordStore::new(dir.path().to_owned())?;
        assert_eq!(reopened.fetch(Query::<TimeEntry>::all()).await?, vec![edited]);
        Ok(())
    }

    #[tokio::test]
    async fn test_recent_entries_newest_first() -> Result<()> {
        let dir = tempdir()?;
        let records = JsonRecordStore::new(dir.path().to_owned())?;
        let start = Utc.with_ymd_and_hms(2025, 11, 6, 9, 0, 0).unwrap();
        let project = Project::new("Website".into(), 100., None, start);
        for day in 0..3 {
            let day_start = start + Duration::days(day);
            records
                .insert(TimeEntry::finished(
                    project.id,
                    day_start,
                    day_start + Duration::hours(1),
                    String::new(),
                ))
                .await?;
        }

        let entries = recent_entries(&records, 2).await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].start_time, start + Duration::days(2));
        assert_eq!(entries[1].start_time, start + Duration::days(1));
        Ok(())
    }
}
