//! Client-side credential checks that decide whether a login succeeds.
//! Nothing here is enforced remotely.

use thiserror::Error;

use crate::mirror::Mapping;
use crate::model::{ExamSession, Room, Student, StudentStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginRejection {
    #[error("No student with NIS {0}")]
    UnknownStudent(String),

    #[error("Wrong password")]
    WrongPassword,

    #[error("Student {0} is blocked")]
    Blocked(String),

    #[error("Student {0} has already finished")]
    AlreadyFinished(String),

    #[error("No active session for class {class} with that PIN")]
    NoMatchingSession { class: String },

    #[error("Unknown proctor account")]
    UnknownProctor,
}

pub fn verify_proctor<'a>(
    rooms: &'a Mapping<Room>,
    username: &str,
    password: &str,
) -> Result<&'a Room, LoginRejection> {
    let username = username.trim();
    let room = rooms
        .values()
        .find(|r| !r.username.is_empty() && r.username == username)
        .ok_or(LoginRejection::UnknownProctor)?;

    if room.password != password {
        return Err(LoginRejection::WrongPassword);
    }
    Ok(room)
}

/// Matches the student by NIS and password, then the PIN against an active session of their class
pub fn verify_student<'a>(
    students: &'a Mapping<Student>,
    sessions: &'a Mapping<ExamSession>,
    nis: &str,
    password: &str,
    pin: &str,
) -> Result<(&'a Student, &'a ExamSession), LoginRejection> {
    let nis = nis.trim();
    let student = students
        .get(nis)
        .ok_or_else(|| LoginRejection::UnknownStudent(nis.to_string()))?;

    if student.password != password {
        return Err(LoginRejection::WrongPassword);
    }

    match student.status {
        StudentStatus::Blocked => return Err(LoginRejection::Blocked(student.nis.clone())),
        StudentStatus::Finished => {
            return Err(LoginRejection::AlreadyFinished(student.nis.clone()))
        }
        StudentStatus::NotStarted | StudentStatus::InProgress => {}
    }

    let session = sessions
        .values()
        .find(|s| s.accepts(&student.class, pin))
        .ok_or_else(|| LoginRejection::NoMatchingSession {
            class: student.class.clone(),
        })?;

    Ok((student, session))
}
