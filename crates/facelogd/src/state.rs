//! Application state: the single owner of the user and record collections.

use crate::store::{Store, StoreError};
use facelog_core::{AttendanceRecord, User};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// State handle shared by the scanner and the D-Bus interface.
pub type SharedState = Arc<Mutex<AppState>>;

pub struct AppState {
    store: Store,
    users: Vec<User>,
    records: Vec<AttendanceRecord>,
    /// Publishes the registered-user count so a parked scan loop can wake.
    users_tx: watch::Sender<usize>,
}

impl AppState {
    /// Read both collections from the store.
    pub fn load(store: Store) -> Result<Self, StoreError> {
        let users = store.load_users()?;
        let records = store.load_records()?;
        tracing::info!(users = users.len(), records = records.len(), "collections loaded");
        let (users_tx, _) = watch::channel(users.len());
        Ok(Self {
            store,
            users,
            records,
            users_tx,
        })
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn subscribe_users(&self) -> watch::Receiver<usize> {
        self.users_tx.subscribe()
    }

    /// Append a user and persist the full collection. The in-memory list is
    /// left unchanged if the write fails.
    pub fn register_user(&mut self, user: User) -> Result<(), StoreError> {
        self.users.push(user);
        if let Err(e) = self.store.save_users(&self.users) {
            self.users.pop();
            return Err(e);
        }
        if let Some(user) = self.users.last() {
            tracing::info!(user_id = %user.id, name = %user.name, "user registered");
        }
        self.users_tx.send_replace(self.users.len());
        Ok(())
    }

    /// Append an attendance record and persist the full collection.
    pub fn record_attendance(&mut self, record: AttendanceRecord) -> Result<(), StoreError> {
        self.records.push(record);
        if let Err(e) = self.store.save_records(&self.records) {
            self.records.pop();
            return Err(e);
        }
        if let Some(record) = self.records.last() {
            tracing::info!(
                user_id = %record.user_id,
                confidence = record.confidence,
                status = record.status.as_str(),
                "attendance recorded"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use facelog_core::AttendanceStatus;

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: format!("name {id}"),
            role: "staff".into(),
            registered_at: Utc::now(),
            photo_base64: "QUJD".into(),
        }
    }

    #[test]
    fn test_register_persists_and_notifies() {
        let mut state = AppState::load(Store::open_in_memory().unwrap()).unwrap();
        let rx = state.subscribe_users();
        assert_eq!(*rx.borrow(), 0);

        state.register_user(user("u1")).unwrap();
        assert_eq!(state.users().len(), 1);
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(state.store.load_users().unwrap()[0].id, "u1");
    }

    #[test]
    fn test_record_attendance_appends() {
        let mut state = AppState::load(Store::open_in_memory().unwrap()).unwrap();
        for i in 0..3 {
            state
                .record_attendance(AttendanceRecord {
                    id: format!("r{i}"),
                    user_id: "u1".into(),
                    user_name: "name u1".into(),
                    timestamp: Utc::now(),
                    status: AttendanceStatus::Present,
                    confidence: 0.8,
                    mood: None,
                })
                .unwrap();
        }
        assert_eq!(state.records().len(), 3);
        assert_eq!(state.store.load_records().unwrap().len(), 3);
    }

    #[test]
    fn test_load_reads_existing_collections() {
        let store = Store::open_in_memory().unwrap();
        store.save_users(&[user("a"), user("b")]).unwrap();
        let state = AppState::load(store).unwrap();
        assert_eq!(state.users().len(), 2);
        assert_eq!(*state.subscribe_users().borrow(), 2);
    }
}
