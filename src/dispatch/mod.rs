//! Mutation dispatch
//!
//! Every write goes through [`Dispatcher::dispatch`], which maps a [`Command`]
//! onto store calls and reports a plain success flag. Local state is never
//! touched here; effects show up through the next mirror snapshot.
//!
//! While any dispatch is outstanding the processing flag is set. It is backed
//! by an in-flight count, so overlapping calls keep it set until the last one
//! returns. The flag is advisory; the dispatcher does not serialize calls
//! itself.

mod command;

pub use command::Command;

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Result;
use crate::store::{to_fields, Collection, RemoteStore};

pub struct Dispatcher {
    store: Arc<dyn RemoteStore>,
    in_flight: watch::Sender<usize>,
}

/// Counts one outstanding dispatch for its lifetime, on every exit path
struct ProcessingGuard<'a> {
    in_flight: &'a watch::Sender<usize>,
}

impl<'a> ProcessingGuard<'a> {
    fn engage(in_flight: &'a watch::Sender<usize>) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self { in_flight }
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Dispatcher {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            in_flight: watch::Sender::new(0),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Number of outstanding dispatches; processing while it is above zero
    pub fn watch_processing(&self) -> watch::Receiver<usize> {
        self.in_flight.subscribe()
    }

    /// Executes one command. Never fails: transport errors become `false`.
    pub async fn dispatch(&self, command: Command) -> bool {
        let _guard = ProcessingGuard::engage(&self.in_flight);
        let name = command.name();

        tracing::debug!(
            command = name,
            collection = %command.collection(),
            target = ?command.target_id(),
            "Dispatching"
        );

        match self.execute(command).await {
            Ok(()) => {
                tracing::info!(command = name, "Dispatch succeeded");
                true
            }
            Err(e) => {
                tracing::error!(
                    command = name,
                    transport = e.is_transport(),
                    error = %e,
                    "Dispatch failed"
                );
                false
            }
        }
    }

    /// Decodes a `{"type": ..., "payload": ...}` command and dispatches it.
    /// Unknown command types return `false` without touching the store.
    pub async fn dispatch_json(&self, raw: &str) -> bool {
        match serde_json::from_str::<Command>(raw) {
            Ok(command) => self.dispatch(command).await,
            Err(e) => {
                let _guard = ProcessingGuard::engage(&self.in_flight);
                tracing::warn!(error = %e, "Command not recognized");
                false
            }
        }
    }

    /// Deletes students one at a time, returning how many deletes succeeded
    pub async fn delete_students(&self, selected: &[String]) -> usize {
        let mut deleted = 0;
        for nis in selected {
            let ok = self
                .dispatch(Command::DeleteStudent { nis: nis.clone() })
                .await;
            if ok {
                deleted += 1;
            }
        }
        tracing::info!(requested = selected.len(), deleted, "Bulk delete finished");
        deleted
    }

    async fn execute(&self, command: Command) -> Result<()> {
        // Add and Update share one merge write: the key is caller-supplied, so the
        // store cannot tell creation from update.
        match command {
            Command::AddStudent(student) => {
                let fields = to_fields(&student)?;
                self.store.set_merge(Collection::Students, &student.nis, fields).await
            }
            Command::UpdateStudent { nis, patch } => {
                let mut fields = to_fields(&patch)?;
                fields.insert("nis".to_string(), nis.clone().into());
                self.store.set_merge(Collection::Students, &nis, fields).await
            }
            Command::DeleteStudent { nis } => self.store.delete(Collection::Students, &nis).await,
            Command::BulkUpdateStudents {
                selected_ids,
                updates,
            } => {
                let fields = to_fields(&updates)?;
                let entries = selected_ids
                    .into_iter()
                    .map(|nis| (nis, fields.clone()))
                    .collect();
                self.store.batch_update(Collection::Students, entries).await
            }
            Command::AddSession(session) => {
                let fields = to_fields(&session)?;
                self.store.set_merge(Collection::Sessions, &session.id, fields).await
            }
            Command::UpdateSession { id, patch } => {
                let mut fields = to_fields(&patch)?;
                fields.insert("id".to_string(), id.clone().into());
                self.store.set_merge(Collection::Sessions, &id, fields).await
            }
            Command::DeleteSession { id } => self.store.delete(Collection::Sessions, &id).await,
            Command::AddRoom(room) => {
                let fields = to_fields(&room)?;
                self.store.set_merge(Collection::Rooms, &room.id, fields).await
            }
            Command::UpdateRoom { id, patch } => {
                let mut fields = to_fields(&patch)?;
                fields.insert("id".to_string(), id.clone().into());
                self.store.set_merge(Collection::Rooms, &id, fields).await
            }
            Command::DeleteRoom { id } => self.store.delete(Collection::Rooms, &id).await,
        }
    }
}
