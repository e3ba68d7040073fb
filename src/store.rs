//! Snapshot store surface consumed by the smart contracts.
//!
//! Contracts execute as pure functions over a snapshot: read, write and
//! delete arbitrary byte strings, no iteration. The contracts themselves
//! live outside this crate and see nothing but this trait, which keeps
//! their execution deterministic and testable with [`MemorySnapshot`].

use std::collections::HashMap;

use crate::errors::DkgError;

/// Key/value view a contract executes against.
pub trait Snapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), DkgError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), DkgError>;
}

/// In-memory snapshot for contract tests.
#[derive(Default)]
pub struct MemorySnapshot {
    entries: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Snapshot for MemorySnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), DkgError> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), DkgError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_set_get_delete() {
        let mut snapshot = MemorySnapshot::new();
        assert!(snapshot.get(b"missing").is_none());

        snapshot.set(b"key", b"value").unwrap();
        assert_eq!(snapshot.get(b"key").unwrap(), b"value");

        snapshot.set(b"key", b"updated").unwrap();
        assert_eq!(snapshot.get(b"key").unwrap(), b"updated");

        snapshot.delete(b"key").unwrap();
        assert!(snapshot.get(b"key").is_none());
        assert!(snapshot.is_empty());
    }
}
