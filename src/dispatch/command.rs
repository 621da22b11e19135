use serde::{Deserialize, Serialize};

use crate::model::{ExamSession, Room, RoomPatch, SessionPatch, Student, StudentPatch};
use crate::store::Collection;

/// The complete write vocabulary. No other mutation path reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    AddStudent(Student),

    UpdateStudent {
        nis: String,
        patch: StudentPatch,
    },

    DeleteStudent {
        nis: String,
    },

    /// Applies `updates` to every selected student atomically
    BulkUpdateStudents {
        #[serde(rename = "selectedIds")]
        selected_ids: Vec<String>,
        updates: StudentPatch,
    },

    AddSession(ExamSession),

    UpdateSession {
        id: String,
        patch: SessionPatch,
    },

    DeleteSession {
        id: String,
    },

    AddRoom(Room),

    UpdateRoom {
        id: String,
        patch: RoomPatch,
    },

    DeleteRoom {
        id: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddStudent(_) => "ADD_STUDENT",
            Command::UpdateStudent { .. } => "UPDATE_STUDENT",
            Command::DeleteStudent { .. } => "DELETE_STUDENT",
            Command::BulkUpdateStudents { .. } => "BULK_UPDATE_STUDENTS",
            Command::AddSession(_) => "ADD_SESSION",
            Command::UpdateSession { .. } => "UPDATE_SESSION",
            Command::DeleteSession { .. } => "DELETE_SESSION",
            Command::AddRoom(_) => "ADD_ROOM",
            Command::UpdateRoom { .. } => "UPDATE_ROOM",
            Command::DeleteRoom { .. } => "DELETE_ROOM",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Command::AddStudent(_)
            | Command::UpdateStudent { .. }
            | Command::DeleteStudent { .. }
            | Command::BulkUpdateStudents { .. } => Collection::Students,
            Command::AddSession(_) | Command::UpdateSession { .. } | Command::DeleteSession { .. } => {
                Collection::Sessions
            }
            Command::AddRoom(_) | Command::UpdateRoom { .. } | Command::DeleteRoom { .. } => {
                Collection::Rooms
            }
        }
    }

    /// Key of the single document this command targets, `None` for bulk commands
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Command::AddStudent(student) => Some(&student.nis),
            Command::UpdateStudent { nis, .. } | Command::DeleteStudent { nis } => Some(nis),
            Command::BulkUpdateStudents { .. } => None,
            Command::AddSession(session) => Some(&session.id),
            Command::AddRoom(room) => Some(&room.id),
            Command::UpdateSession { id, .. }
            | Command::DeleteSession { id }
            | Command::UpdateRoom { id, .. }
            | Command::DeleteRoom { id } => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentStatus;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let command = Command::DeleteStudent {
            nis: "001".to_string(),
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value, json!({"type": "DELETE_STUDENT", "payload": {"nis": "001"}}));
    }

    #[test]
    fn test_bulk_update_decodes() {
        let raw = r#"{
            "type": "BULK_UPDATE_STUDENTS",
            "payload": {"selectedIds": ["001", "002"], "updates": {"status": "BLOCKED"}}
        }"#;
        let command: Command = serde_json::from_str(raw).unwrap();
        match command {
            Command::BulkUpdateStudents { selected_ids, updates } => {
                assert_eq!(selected_ids, vec!["001", "002"]);
                assert_eq!(updates.status, Some(StudentStatus::Blocked));
                assert!(updates.name.is_none());
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_does_not_decode() {
        let raw = r#"{"type": "DROP_DATABASE", "payload": {}}"#;
        assert!(serde_json::from_str::<Command>(raw).is_err());
    }

    #[test]
    fn test_collection_and_target() {
        let command = Command::AddRoom(Room::new("R1", "A"));
        assert_eq!(command.name(), "ADD_ROOM");
        assert_eq!(command.collection(), Collection::Rooms);
        assert_eq!(command.target_id(), Some("R1"));

        let bulk = Command::BulkUpdateStudents {
            selected_ids: vec![],
            updates: StudentPatch::default(),
        };
        assert_eq!(bulk.collection(), Collection::Students);
        assert!(bulk.target_id().is_none());
    }
}
