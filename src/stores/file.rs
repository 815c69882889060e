//! Snapshot store backed by one JSON file per session key.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::SnapshotStore;
use crate::{
    error::StoreError,
    models::session::{SessionKey, Snapshot},
};

pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Opens (creating if needed) the snapshot directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}.json", encode_component(&key.subject_id), key.exam_id))
    }
}

/// Escapes everything except ASCII alphanumerics, so distinct subject ids
/// always map to distinct file names.
fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}

impl SnapshotStore for FileSnapshotStore {
    fn get(&self, key: &SessionKey) -> Result<Option<Snapshot>, StoreError> {
        let raw = match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn set(&self, key: &SessionKey, snapshot: &Snapshot) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{Answer, SessionState};

    fn snapshot(key: &SessionKey) -> Snapshot {
        let mut state = SessionState::fresh(key, 5_000);
        state.answers.insert(1, Answer::Text("x".to_string()));
        Snapshot {
            exam_id: key.exam_id,
            exam_title: "Exam".to_string(),
            state,
            saved_at: 5_000,
        }
    }

    #[test]
    fn test_encode_component_escapes_separators() {
        assert_eq!(encode_component("user42"), "user42");
        assert_eq!(encode_component("a.b/c"), "a%2Eb%2Fc");
        assert_ne!(encode_component("a_b"), encode_component("a%5Fb"));
        assert_eq!(
            encode_component("guest:1f0e-42"),
            "guest%3A1f0e%2D42"
        );
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn test_set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let key = SessionKey::new("user@example.com", 3);

        assert!(store.get(&key).unwrap().is_none());
        store.set(&key, &snapshot(&key)).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(snapshot(&key)));

        store.delete(&key).unwrap();
        assert!(store.get(&key).unwrap().is_none());
        // Deleting again is fine.
        store.delete(&key).unwrap();
    }

    #[test]
    fn test_keys_with_lookalike_subjects_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let a = SessionKey::new("a.1", 2);
        let b = SessionKey::new("a", 12);

        store.set(&a, &snapshot(&a)).unwrap();
        assert!(store.get(&b).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).unwrap();
        let key = SessionKey::new("guest", 1);
        fs::write(store.path_for(&key), b"garbage").unwrap();
        assert!(matches!(store.get(&key), Err(StoreError::Serialization(_))));
    }
}
