use std::collections::HashMap;
use std::sync::RwLock;

use stag_api::Mesh;

/// Последний принятый raw mesh для каждого anchor'а.
///
/// Живёт столько же, сколько процесс; при рестарте теряется. Используется
/// только для решения delta-vs-full, на корректность чтения не влияет.
/// Конкурентные ingest'ы одного anchor'а: last writer wins.
#[derive(Debug, Default)]
pub struct VersionCache {
    entries: RwLock<HashMap<String, Mesh>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, anchor_id: &str) -> Option<Mesh> {
        let guard = match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("version cache read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.get(anchor_id).cloned()
    }

    /// Перезаписать запись anchor'а этим mesh'ем.
    pub fn put(&self, mesh: Mesh) {
        let mut guard = match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("version cache write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.insert(mesh.anchor_id.clone(), mesh);
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
