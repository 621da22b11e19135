use serde::{Deserialize, Serialize};

use super::lenient;

/// An exam session. Students log in by matching `pin` and `class`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSession {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub class: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub pin: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub duration_minutes: u32,
    #[serde(default, deserialize_with = "lenient::string")]
    pub pdf_url: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_active: bool,
    /// Opaque to this crate
    #[serde(default, deserialize_with = "lenient::list")]
    pub questions: Vec<serde_json::Value>,
}

impl ExamSession {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class: String::new(),
            pin: String::new(),
            duration_minutes: 0,
            pdf_url: String::new(),
            is_active: false,
            questions: Vec::new(),
        }
    }

    pub fn accepts(&self, class: &str, pin: &str) -> bool {
        self.is_active && self.class.trim() == class.trim() && self.pin.trim() == pin.trim()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<serde_json::Value>>,
}

impl SessionPatch {
    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Default::default()
        }
    }
}
