mod credential;
mod login;
mod machine;

pub use credential::{
    Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore, CREDENTIAL_KEY,
};
pub use login::{verify_proctor, verify_student, LoginRejection};
pub use machine::{spawn_room_watch, SessionMachine, SessionState};
