use std::fmt::Display;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::time::as_hours;

use super::record_storage::Record;

pub type ClientId = Uuid;
pub type ProjectId = Uuid;
pub type RecordId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub color_hex: String,
    pub default_hourly_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(name: String, color_hex: String, default_hourly_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            color_hex,
            default_hourly_rate,
            created_at: now,
        }
    }
}

/// A billable context. Clients are referenced by id and resolved through the store when needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub hourly_rate: f64,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, hourly_rate: f64, client_id: Option<ClientId>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            hourly_rate,
            is_archived: false,
            client_id,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn display_name(&self, client: Option<&Client>) -> String {
        match client {
            Some(client) => format!("{} - {}", client.name, self.name),
            None => self.name.clone(),
        }
    }
}

/// Billable time spent on a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: RecordId,
    pub project_id: ProjectId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, with = "optional_duration_ser")]
    pub manual_duration: Option<Duration>,
}

impl TimeEntry {
    pub fn new(project_id: ProjectId, start_time: DateTime<Utc>, notes: String) -> Self {
        Self::with_id(Uuid::new_v4(), project_id, start_time, notes)
    }

    /// An entry added by hand for work that already happened.
    pub fn finished(
        project_id: ProjectId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        notes: String,
    ) -> Self {
        Self {
            end_time: Some(end_time),
            ..Self::new(project_id, start_time, notes)
        }
    }

    pub fn with_id(
        id: RecordId,
        project_id: ProjectId,
        start_time: DateTime<Utc>,
        notes: String,
    ) -> Self {
        Self {
            id,
            project_id,
            start_time,
            end_time: None,
            notes,
            manual_duration: None,
        }
    }

    /// A manual override wins. Entries still running are measured up to `now`.
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        if let Some(manual) = self.manual_duration {
            return manual;
        }
        (self.end_time.unwrap_or(now) - self.start_time).max(Duration::zero())
    }

    pub fn earnings(&self, hourly_rate: f64, now: DateTime<Utc>) -> f64 {
        as_hours(self.duration(now)) * hourly_rate
    }

    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Quick focused burst for smaller tasks
    Sprint,
    /// Extended focus for complex work
    DeepWork,
    /// Maximum uninterrupted deep work
    FlowState,
}

impl SessionType {
    pub fn default_duration(self) -> Duration {
        match self {
            SessionType::Sprint => Duration::minutes(25),
            SessionType::DeepWork => Duration::minutes(90),
            SessionType::FlowState => Duration::minutes(180),
        }
    }
}

impl Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionType::Sprint => write!(f, "Sprint"),
            SessionType::DeepWork => write!(f, "Deep Work"),
            SessionType::FlowState => write!(f, "Flow State"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Building,
    Content,
    Marketing,
    Design,
    Customer,
    Business,
    Learning,
}

impl Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskCategory::Building => "Building",
            TaskCategory::Content => "Content",
            TaskCategory::Marketing => "Marketing",
            TaskCategory::Design => "Design",
            TaskCategory::Customer => "Customer",
            TaskCategory::Business => "Business",
            TaskCategory::Learning => "Learning",
        };
        f.write_str(name)
    }
}

/// A deep work session. Pause bookkeeping is kept on the record so the actual focused time can
/// be recomputed from the record alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: RecordId,
    pub session_type: SessionType,
    pub category: TaskCategory,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(with = "duration_ser")]
    pub planned_duration: Duration,
    #[serde(default = "Duration::zero", with = "duration_ser")]
    pub total_paused: Duration,
    #[serde(default)]
    pub interruption_count: u32,
    #[serde(default)]
    pub focus_quality: Option<u8>,
    #[serde(default)]
    pub energy_level: Option<u8>,
    #[serde(default)]
    pub task_title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FocusSession {
    pub fn actual_duration(&self, now: DateTime<Utc>) -> Duration {
        ((self.end_time.unwrap_or(now) - self.start_time) - self.total_paused).max(Duration::zero())
    }

    /// Share of the planned duration already spent, capped at 1.
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        if self.planned_duration <= Duration::zero() {
            return 0.;
        }
        let ratio = self.actual_duration(now).num_milliseconds() as f64
            / self.planned_duration.num_milliseconds() as f64;
        ratio.min(1.)
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    MustDo,
    #[default]
    ShouldDo,
    CouldDo,
}

impl Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::MustDo => write!(f, "Must Do"),
            TaskPriority::ShouldDo => write!(f, "Should Do"),
            TaskPriority::CouldDo => write!(f, "Could Do"),
        }
    }
}

/// Something to get done. Daily intentions are the tasks picked for one particular day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: RecordId,
    pub title: String,
    pub category: TaskCategory,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub actual_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_daily_intention: bool,
}

impl TaskItem {
    pub fn new(
        title: String,
        category: TaskCategory,
        priority: TaskPriority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            category,
            priority,
            is_completed: false,
            created_at: now,
            completed_at: None,
            estimated_minutes: None,
            actual_minutes: None,
            notes: None,
            is_daily_intention: false,
        }
    }

    /// Keeps a previously recorded actual time when `actual_minutes` is `None`.
    pub fn complete(&mut self, now: DateTime<Utc>, actual_minutes: Option<u32>) {
        self.is_completed = true;
        self.completed_at = Some(now);
        if actual_minutes.is_some() {
            self.actual_minutes = actual_minutes;
        }
    }

    pub fn uncomplete(&mut self) {
        self.is_completed = false;
        self.completed_at = None;
    }

    /// Actual minus estimated minutes. Positive means the task took longer than planned.
    pub fn time_variance(&self) -> Option<i64> {
        Some(i64::from(self.actual_minutes?) - i64::from(self.estimated_minutes?))
    }

    /// An open intention created before the day that starts at `today_start`.
    pub fn is_overdue(&self, today_start: DateTime<Utc>) -> bool {
        !self.is_completed && self.is_daily_intention && self.created_at < today_start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnergyPeriod {
    Morning,
    Afternoon,
    Evening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Reflection {
    Win,
    Challenge,
    Learning,
}

/// Check-ins and reflections of one local day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub id: RecordId,
    pub date: NaiveDate,
    #[serde(default)]
    pub morning_energy: Option<u8>,
    #[serde(default)]
    pub afternoon_energy: Option<u8>,
    #[serde(default)]
    pub evening_energy: Option<u8>,
    #[serde(default)]
    pub overall_mood: Option<u8>,
    #[serde(default)]
    pub wins: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub daily_notes: Option<String>,
}

impl DailyLog {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            morning_energy: None,
            afternoon_energy: None,
            evening_energy: None,
            overall_mood: None,
            wins: Vec::new(),
            challenges: Vec::new(),
            learnings: Vec::new(),
            daily_notes: None,
        }
    }

    pub fn energy_mut(&mut self, period: EnergyPeriod) -> &mut Option<u8> {
        match period {
            EnergyPeriod::Morning => &mut self.morning_energy,
            EnergyPeriod::Afternoon => &mut self.afternoon_energy,
            EnergyPeriod::Evening => &mut self.evening_energy,
        }
    }

    /// Mean of the energy check-ins made so far.
    pub fn average_energy(&self) -> Option<f64> {
        let levels = [self.morning_energy, self.afternoon_energy, self.evening_energy]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        if levels.is_empty() {
            return None;
        }
        Some(levels.iter().map(|&v| f64::from(v)).sum::<f64>() / levels.len() as f64)
    }

    pub fn reflections(&self, kind: Reflection) -> &[String] {
        match kind {
            Reflection::Win => &self.wins,
            Reflection::Challenge => &self.challenges,
            Reflection::Learning => &self.learnings,
        }
    }

    fn reflections_mut(&mut self, kind: Reflection) -> &mut Vec<String> {
        match kind {
            Reflection::Win => &mut self.wins,
            Reflection::Challenge => &mut self.challenges,
            Reflection::Learning => &mut self.learnings,
        }
    }

    pub fn add_reflection(&mut self, kind: Reflection, text: String) {
        self.reflections_mut(kind).push(text);
    }

    /// Out of range indices leave the log untouched.
    pub fn remove_reflection(&mut self, kind: Reflection, index: usize) -> Option<String> {
        let items = self.reflections_mut(kind);
        (index < items.len()).then(|| items.remove(index))
    }

    pub fn has_any_entry(&self) -> bool {
        self.average_energy().is_some()
            || self.overall_mood.is_some()
            || !self.wins.is_empty()
            || !self.challenges.is_empty()
            || !self.learnings.is_empty()
            || self.daily_notes.as_deref().is_some_and(|n| !n.is_empty())
    }
}

impl Record for Client {
    type Id = ClientId;
    const COLLECTION: &'static str = "clients";

    fn id(&self) -> ClientId {
        self.id
    }
}

impl Record for Project {
    type Id = ProjectId;
    const COLLECTION: &'static str = "projects";

    fn id(&self) -> ProjectId {
        self.id
    }
}

impl Record for TimeEntry {
    type Id = RecordId;
    const COLLECTION: &'static str = "time_entries";

    fn id(&self) -> RecordId {
        self.id
    }
}

impl Record for FocusSession {
    type Id = RecordId;
    const COLLECTION: &'static str = "focus_sessions";

    fn id(&self) -> RecordId {
        self.id
    }
}

impl Record for TaskItem {
    type Id = RecordId;
    const COLLECTION: &'static str = "tasks";

    fn id(&self) -> RecordId {
        self.id
    }
}

impl Record for DailyLog {
    type Id = RecordId;
    const COLLECTION: &'static str = "daily_logs";

    fn id(&self) -> RecordId {
        self.id
    }
}

/// Durations are stored as whole milliseconds.
pub(crate) mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(ms))
    }
}

pub(crate) mod optional_duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&duration.num_milliseconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<i64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::milliseconds))
    }
}
