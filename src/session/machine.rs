use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::credential::{Credential, CredentialStore};
use crate::dispatch::{Command, Dispatcher};
use crate::error::{Result, SyncError};
use crate::mirror::{LiveMirror, Mapping};
use crate::model::{ExamSession, Room, Student, StudentPatch, StudentStatus};
use crate::store::Collection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    StudentExam { student_id: String, session_id: String },
    Admin,
    Proctor { room_id: String },
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Anonymous
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Anonymous => write!(f, "ANONYMOUS"),
            SessionState::StudentExam {
                student_id,
                session_id,
            } => write!(f, "STUDENT_EXAM({}, {})", student_id, session_id),
            SessionState::Admin => write!(f, "ADMIN"),
            SessionState::Proctor { room_id } => write!(f, "PROCTOR({})", room_id),
        }
    }
}

/// Role/session automaton driven by logins, logouts and room snapshots
///
/// The credential store is the only persisted piece of state. It is written
/// on admin or proctor login and cleared on logout or when a proctor's room
/// disappears from the mirror.
pub struct SessionMachine {
    state: SessionState,
    credentials: Box<dyn CredentialStore>,
}

impl SessionMachine {
    /// Starts anonymous, then adopts the persisted credential if there is a readable one
    pub fn new(credentials: Box<dyn CredentialStore>) -> Self {
        let state = match credentials.load() {
            Ok(Some(Credential::Admin)) => SessionState::Admin,
            Ok(Some(Credential::Proctor { room_id })) => SessionState::Proctor { room_id },
            Ok(None) => SessionState::Anonymous,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable session credential");
                SessionState::Anonymous
            }
        };

        tracing::info!(state = %state, "Session initialised");
        Self { state, credentials }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn require_anonymous(&self, action: &'static str) -> Result<()> {
        if self.state != SessionState::Anonymous {
            return Err(SyncError::InvalidTransition {
                from: self.state.to_string(),
                action,
            });
        }
        Ok(())
    }

    /// Admin credentials have already been checked by the caller
    pub fn login_admin(&mut self) -> Result<()> {
        self.require_anonymous("admin login")?;
        self.credentials.save(&Credential::Admin)?;
        self.state = SessionState::Admin;
        tracing::info!("Admin logged in");
        Ok(())
    }

    pub fn login_proctor(&mut self, room: &Room) -> Result<()> {
        self.require_anonymous("proctor login")?;
        self.credentials.save(&Credential::Proctor {
            room_id: room.id.clone(),
        })?;
        self.state = SessionState::Proctor {
            room_id: room.id.clone(),
        };
        tracing::info!(room_id = %room.id, "Proctor logged in");
        Ok(())
    }

    /// Marks the student as in progress and enters the exam only if that write succeeds.
    /// `Ok(false)` means the write failed and the machine is still anonymous.
    pub async fn login_student(
        &mut self,
        dispatcher: &Dispatcher,
        student: &Student,
        session: &ExamSession,
    ) -> Result<bool> {
        self.require_anonymous("student login")?;

        let ok = dispatcher
            .dispatch(Command::UpdateStudent {
                nis: student.nis.clone(),
                patch: StudentPatch::status(StudentStatus::InProgress),
            })
            .await;

        if !ok {
            tracing::warn!(nis = %student.nis, "Student login failed, status update rejected");
            return Ok(false);
        }

        self.state = SessionState::StudentExam {
            student_id: student.nis.clone(),
            session_id: session.id.clone(),
        };
        tracing::info!(nis = %student.nis, session_id = %session.id, "Student entered exam");
        Ok(true)
    }

    /// Leaves the exam whatever happens to the finishing write; returns that write's outcome
    pub async fn finish_exam(&mut self, dispatcher: &Dispatcher) -> Result<bool> {
        let student_id = match &self.state {
            SessionState::StudentExam { student_id, .. } => student_id.clone(),
            other => {
                return Err(SyncError::InvalidTransition {
                    from: other.to_string(),
                    action: "finish exam",
                })
            }
        };

        let ok = dispatcher
            .dispatch(Command::UpdateStudent {
                nis: student_id.clone(),
                patch: StudentPatch::finished(),
            })
            .await;
        if !ok {
            tracing::warn!(nis = %student_id, "Finish write failed, leaving exam anyway");
        }

        self.state = SessionState::Anonymous;
        Ok(ok)
    }

    pub fn logout(&mut self) -> Result<()> {
        match self.state {
            SessionState::Admin | SessionState::Proctor { .. } => {}
            SessionState::Anonymous => return Ok(()),
            SessionState::StudentExam { .. } => {
                return Err(SyncError::InvalidTransition {
                    from: self.state.to_string(),
                    action: "logout",
                })
            }
        }

        if let Err(e) = self.credentials.clear() {
            tracing::error!(error = %e, "Failed to clear session credential");
        }
        tracing::info!(from = %self.state, "Logged out");
        self.state = SessionState::Anonymous;
        Ok(())
    }

    /// Drops a proctor session whose room no longer exists. Returns whether it did.
    pub fn on_rooms(&mut self, rooms: &Mapping<Room>) -> bool {
        let room_id = match &self.state {
            SessionState::Proctor { room_id } if !rooms.contains_key(room_id) => room_id.clone(),
            _ => return false,
        };

        tracing::warn!(room_id = %room_id, "Proctor room no longer exists, dropping session");
        if let Err(e) = self.credentials.clear() {
            tracing::error!(error = %e, "Failed to clear stale session credential");
        }
        self.state = SessionState::Anonymous;
        true
    }
}

/// Feeds every room snapshot from the mirror into the machine until the mirror stops
///
/// Nothing is checked before the first room snapshot arrives, so a restored
/// proctor session is not dropped against a still-empty mapping.
pub fn spawn_room_watch(
    machine: Arc<Mutex<SessionMachine>>,
    mirror: Arc<LiveMirror>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rooms = mirror.watch_rooms();

        tokio::select! {
            biased;
            _ = mirror.wait_stopped() => return,
            _ = mirror.wait_received(Collection::Rooms) => {}
        }

        loop {
            let current = rooms.borrow_and_update().clone();
            machine.lock().await.on_rooms(&current);

            tokio::select! {
                biased;
                _ = mirror.wait_stopped() => break,
                changed = rooms.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Room watch finished");
    })
}
