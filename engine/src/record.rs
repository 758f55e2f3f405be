//! Record types shared by the local store, the remote and the wire.

use crate::{OwnerId, RecordId, Timestamp};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// The independent record categories that take part in sync.
///
/// Declaration order is the iteration order used everywhere a pass walks
/// "every kind", so payloads, stats and logs are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "tasks")]
    Task,
    #[serde(rename = "expenses")]
    Expense,
    #[serde(rename = "journals")]
    Journal,
    #[serde(rename = "goals")]
    Goal,
    #[serde(rename = "calendarNotes")]
    CalendarNote,
    #[serde(rename = "sleepEntries")]
    SleepEntry,
    #[serde(rename = "moodEntries")]
    MoodEntry,
    #[serde(rename = "reflections")]
    Reflection,
}

impl EntityKind {
    /// Every kind, in iteration order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Task,
        EntityKind::Expense,
        EntityKind::Journal,
        EntityKind::Goal,
        EntityKind::CalendarNote,
        EntityKind::SleepEntry,
        EntityKind::MoodEntry,
        EntityKind::Reflection,
    ];

    /// Key used for this kind in JSON payloads (`tasks`, `calendarNotes`, ...).
    pub fn wire_name(self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Expense => "expenses",
            EntityKind::Journal => "journals",
            EntityKind::Goal => "goals",
            EntityKind::CalendarNote => "calendarNotes",
            EntityKind::SleepEntry => "sleepEntries",
            EntityKind::MoodEntry => "moodEntries",
            EntityKind::Reflection => "reflections",
        }
    }

    /// Singular, human readable label.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Expense => "expense",
            EntityKind::Journal => "journal",
            EntityKind::Goal => "goal",
            EntityKind::CalendarNote => "calendar note",
            EntityKind::SleepEntry => "sleep entry",
            EntityKind::MoodEntry => "mood entry",
            EntityKind::Reflection => "reflection",
        }
    }

    /// Plural, human readable label.
    pub fn plural_label(self) -> &'static str {
        match self {
            EntityKind::Task => "tasks",
            EntityKind::Expense => "expenses",
            EntityKind::Journal => "journals",
            EntityKind::Goal => "goals",
            EntityKind::CalendarNote => "calendar notes",
            EntityKind::SleepEntry => "sleep entries",
            EntityKind::MoodEntry => "mood entries",
            EntityKind::Reflection => "reflections",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == s)
            .ok_or_else(|| crate::Error::UnknownKind(s.to_string()))
    }
}

/// How recently a record was touched, as far as the sync engine can tell.
///
/// Some stored kinds predate mutation timestamps, so recency can be
/// genuinely unknown. Unknown recency is always treated as "changed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    Known(Timestamp),
    Unknown,
}

impl Recency {
    /// Whether a record with this recency changed after `watermark`.
    pub fn is_after(&self, watermark: Timestamp) -> bool {
        match self {
            Recency::Known(at) => *at > watermark,
            Recency::Unknown => true,
        }
    }
}

/// A synchronizable record of any entity kind.
///
/// Only identity, ownership and timestamps are meaningful to sync; every
/// other field is kept verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique identifier within the record's kind
    #[serde(default)]
    pub id: RecordId,
    /// Owning identity
    #[serde(default)]
    pub user_id: OwnerId,
    /// When the record was created
    #[serde(
        default,
        alias = "created_at",
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<Timestamp>,
    /// When the record was last mutated
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Timestamp>,
    /// Entity-specific payload, opaque to sync
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Create a record with no payload fields.
    pub fn new(id: impl Into<RecordId>, user_id: impl Into<OwnerId>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            created_at: None,
            updated_at: None,
            fields: serde_json::Map::new(),
        }
    }

    /// Set the creation timestamp.
    pub fn created(mut self, at: Timestamp) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Set the mutation timestamp.
    pub fn updated(mut self, at: Timestamp) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Add an entity-specific field.
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// `updatedAt`, falling back to `createdAt`.
    pub fn recency(&self) -> Recency {
        match self.updated_at.or(self.created_at) {
            Some(at) => Recency::Known(at),
            None => Recency::Unknown,
        }
    }

    /// Whether the record is owned by `identity`.
    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.user_id == identity
    }

    /// Whether the record carries a usable identity.
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// Parse an RFC 3339 timestamp, or a naive one taken to be UTC.
///
/// Older servers write `datetime.utcnow()` values with no offset.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|raw| {
        parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    })
    .transpose()
}
