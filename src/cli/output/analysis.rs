use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::{
    storage::entities::{Client, FocusSession, Project, ProjectId, TaskCategory, TimeEntry},
    utils::percentage::{duration_percentage, Percentage},
};

#[derive(Debug, PartialEq)]
pub struct ProjectUsage {
    pub label: String,
    pub duration: Duration,
    pub earnings: f64,
}

#[derive(Debug, PartialEq)]
pub struct CategoryUsage {
    pub category: TaskCategory,
    pub duration: Duration,
    pub sessions: usize,
}

/// Returns tracked time per project, longest first, together with the total tracked time.
/// Projects below `min_share` of the total are left out. Entries of projects that no longer
/// exist are grouped as "Deleted project".
pub fn analyze_entries(
    entries: Vec<TimeEntry>,
    projects: &[Project],
    clients: &[Client],
    min_share: Percentage,
    now: DateTime<Utc>,
) -> (Vec<ProjectUsage>, Duration) {
    let mut map = HashMap::<Option<ProjectId>, ProjectUsage>::new();
    let mut total = Duration::zero();

    for entry in entries {
        let duration = entry.duration(now);
        total += duration;

        let project = projects.iter().find(|p| p.id == entry.project_id);
        let usage = map
            .entry(project.map(|p| p.id))
            .or_insert_with(|| ProjectUsage {
                label: match project {
                    Some(project) => project.display_name(
                        project
                            .client_id
                            .and_then(|id| clients.iter().find(|c| c.id == id)),
                    ),
                    None => "Deleted project".into(),
                },
                duration: Duration::zero(),
                earnings: 0.,
            });
        usage.duration += duration;
        usage.earnings += project
            .map(|p| entry.earnings(p.hourly_rate, now))
            .unwrap_or(0.);
    }

    let mut usages = map
        .into_values()
        .filter(|v| duration_percentage(v.duration, total) >= min_share)
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| b.duration.cmp(&a.duration).then_with(|| a.label.cmp(&b.label)));
    (usages, total)
}

/// Returns focused time per category, longest first, together with the total focused time.
pub fn analyze_sessions(
    sessions: Vec<FocusSession>,
    now: DateTime<Utc>,
) -> (Vec<CategoryUsage>, Duration) {
    let mut map = HashMap::<TaskCategory, CategoryUsage>::new();
    let mut total = Duration::zero();

    for session in sessions {
        let duration = session.actual_duration(now);
        total += duration;
        let usage = map.entry(session.category).or_insert_with(|| CategoryUsage {
            category: session.category,
            duration: Duration::zero(),
            sessions: 0,
        });
        usage.duration += duration;
        usage.sessions += 1;
    }

    let mut usages = map.into_values().collect::<Vec<_>>();
    usages.sort_by(|a, b| b.duration.cmp(&a.duration).then_with(|| a.category.cmp(&b.category)));
    (usages, total)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use crate::{
        storage::entities::{Client, FocusSession, Project, SessionType, TaskCategory, TimeEntry},
        utils::percentage::Percentage,
    };

    use super::{analyze_entries, analyze_sessions};

    fn finished(project: &Project, minutes: i64) -> TimeEntry {
        let start = Utc.with_ymd_and_hms(2025, 11, 6, 9, 0, 0).unwrap();
        let mut entry = TimeEntry::new(project.id, start, String::new());
        entry.end_time = Some(start + Duration::minutes(minutes));
        entry
    }

    #[test]
    fn groups_entries_by_project() {
        let now = Utc.with_ymd_and_hms(2025, 11, 6, 18, 0, 0).unwrap();
        let client = Client::new("Acme".into(), "FF9500".into(), 80., now);
        let website = Project::new("Website".into(), 120., Some(client.id), now);
        let blog = Project::new("Blog".into(), 60., None, now);
        let mut orphan = finished(&blog, 10);
        orphan.project_id = Uuid::new_v4();

        let entries = vec![
            finished(&website, 60),
            finished(&blog, 30),
            finished(&website, 30),
            orphan,
        ];
        let (usages, total) = analyze_entries(
            entries,
            &[website, blog],
            &[client],
            Percentage::ZERO,
            now,
        );

        assert_eq!(total, Duration::minutes(130));
        assert_eq!(usages[0].label, "Acme - Website");
        assert_eq!(usages[0].duration, Duration::minutes(90));
        assert!((usages[0].earnings - 180.).abs() < 1e-9);
        assert_eq!(usages[1].label, "Blog");
        assert_eq!(usages[2].label, "Deleted project");
        assert_eq!(usages[2].earnings, 0.);
    }

    #[test]
    fn small_shares_are_filtered() {
        let now = Utc.with_ymd_and_hms(2025, 11, 6, 18, 0, 0).unwrap();
        let website = Project::new("Website".into(), 120., None, now);
        let blog = Project::new("Blog".into(), 60., None, now);
        let entries = vec![finished(&website, 95), finished(&blog, 5)];

        let min_share = Percentage::new_opt(10.).unwrap();
        let (usages, total) = analyze_entries(entries, &[website, blog], &[], min_share, now);
        assert_eq!(usages.len(), 1);
        assert_eq!(total, Duration::minutes(100));
    }

    #[test]
    fn groups_sessions_by_category() {
        let start = Utc.with_ymd_and_hms(2025, 11, 6, 9, 0, 0).unwrap();
        let session = |category, minutes| FocusSession {
            id: Uuid::new_v4(),
            session_type: SessionType::Sprint,
            category,
            start_time: start,
            end_time: Some(start + Duration::minutes(minutes)),
            planned_duration: Duration::minutes(25),
            total_paused: Duration::minutes(5),
            interruption_count: 0,
            focus_quality: None,
            energy_level: None,
            task_title: None,
            notes: None,
        };

        let (usages, total) = analyze_sessions(
            vec![
                session(TaskCategory::Design, 30),
                session(TaskCategory::Learning, 20),
                session(TaskCategory::Design, 25),
            ],
            start,
        );
        assert_eq!(total, Duration::minutes(60));
        assert_eq!(usages[0].category, TaskCategory::Design);
        assert_eq!(usages[0].duration, Duration::minutes(45));
        assert_eq!(usages[0].sessions, 2);
        assert_eq!(usages[1].duration, Duration::minutes(15));
    }
}
