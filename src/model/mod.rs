mod lenient;
mod room;
mod session;
mod student;

pub use room::{Room, RoomPatch};
pub use session::{ExamSession, SessionPatch};
pub use student::{Student, StudentPatch, StudentStatus};

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate a timestamp-derived document id for sessions and rooms
///
/// Milliseconds since the epoch followed by a three digit random suffix, so two
/// creations within the same millisecond do not collide.
pub fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let mut rng = rand::thread_rng();
    format!("{}{:03}", millis, rng.gen_range(0..1000))
}
