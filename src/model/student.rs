use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::lenient;

/// Exam progress of a student. The store does not constrain transitions between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentStatus {
    #[default]
    NotStarted,
    InProgress,
    Finished,
    Blocked,
}

impl StudentStatus {
    pub const ALL: [StudentStatus; 4] = [
        StudentStatus::NotStarted,
        StudentStatus::InProgress,
        StudentStatus::Finished,
        StudentStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::NotStarted => "NOT_STARTED",
            StudentStatus::InProgress => "IN_PROGRESS",
            StudentStatus::Finished => "FINISHED",
            StudentStatus::Blocked => "BLOCKED",
        }
    }

    /// Case-insensitive match against the wire names, `None` for anything else.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        let upper = value.trim().to_uppercase();
        Self::ALL.into_iter().find(|s| s.as_str() == upper)
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| format!("unknown student status: {}", s))
    }
}

/// A student document. `nis` doubles as the remote document key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default, deserialize_with = "lenient::string")]
    pub nis: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub class: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub room_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub password: String,
    #[serde(default, deserialize_with = "lenient::status")]
    pub status: StudentStatus,
    #[serde(default, deserialize_with = "lenient::count")]
    pub violations: u32,
}

impl Student {
    pub fn new(nis: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            nis: nis.into(),
            name: name.into(),
            class: String::new(),
            room_id: None,
            password: String::new(),
            status: StudentStatus::NotStarted,
            violations: 0,
        }
    }

    /// Assigned room id, treating an empty string the same as no room.
    pub fn room(&self) -> Option<&str> {
        self.room_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// Partial student fields for merge writes. Absent fields are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// `Some(None)` clears the room assignment.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub room_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StudentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<u32>,
}

impl StudentPatch {
    pub fn status(status: StudentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// The write issued when a student ends their exam.
    pub fn finished() -> Self {
        Self {
            status: Some(StudentStatus::Finished),
            violations: Some(0),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
