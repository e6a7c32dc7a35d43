use std::future::Future;
use std::pin::Pin;

use crate::StagError;

pub const ANCHORS_COLLECTION: &str = "anchors";
pub const MESHES_COLLECTION: &str = "meshes";

// ════════════════════════════════════════════════════════════════
//  Document store contract
// ════════════════════════════════════════════════════════════════

/// Внешний persistent store. Ядру нужны только put/get по ключу,
/// индексы и ad-hoc запросы остаются на стороне реализации.
///
/// Контракт ошибок:
/// - `get` отсутствующего ключа → `StagError::NotFound`
/// - сбой I/O → `StagError::TransientStore`
///
/// - `insert` существующего ключа → `StagError::Conflict`
///
/// Обе записи атомарны на уровне одного документа. `put` — upsert
/// (anchors), `insert` — create-only (mesh records неизменяемы).
pub trait DocumentStore: Send + Sync {
    fn put(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), StagError>> + Send + '_>>;

    fn insert(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), StagError>> + Send + '_>>;

    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, StagError>> + Send + '_>>;

    /// Имя backend'а для health endpoint'а.
    fn name(&self) -> &str;
}
