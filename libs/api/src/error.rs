/// Категория ошибки. Позволяет вызывающей стороне решить,
/// что делать с ошибкой: отбросить запись, повторить, вернуть клиенту.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Входные массивы не кратны 3 (или байты не кратны 4) — permanent.
    Shape,
    /// Битый/чужой буфер, не совпал magic tag, обрезанный payload — permanent.
    Format,
    /// Отсутствует base mesh или anchor.
    NotFound,
    /// Сбой I/O у store — единственная категория, которую можно повторять.
    TransientStore,
    /// Запись с таким ключом уже существует; записи create-only.
    Conflict,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Shape => f.write_str("shape"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::NotFound => f.write_str("not_found"),
            ErrorKind::TransientStore => f.write_str("transient_store"),
            ErrorKind::Conflict => f.write_str("conflict"),
        }
    }
}

/// Unified error type for the codec, diff and pipeline layers.
///
/// Every variant maps onto exactly one `ErrorKind`, so callers can branch
/// on `kind()` for retry-vs-surface decisions without string matching.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StagError {
    #[error("shape: {0}")]
    Shape(String),

    #[error("format: {0}")]
    Format(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store: {0}")]
    TransientStore(String),

    #[error("already exists: {0}")]
    Conflict(String),
}

impl StagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StagError::Shape(_) => ErrorKind::Shape,
            StagError::Format(_) => ErrorKind::Format,
            StagError::NotFound(_) => ErrorKind::NotFound,
            StagError::TransientStore(_) => ErrorKind::TransientStore,
            StagError::Conflict(_) => ErrorKind::Conflict,
        }
    }

    /// Только store I/O имеет смысл повторять; ядро само не ретраит.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStore
    }
}

impl From<serde_json::Error> for StagError {
    fn from(e: serde_json::Error) -> Self {
        StagError::Format(e.to_string())
    }
}

/// Ошибка обработки конкретного mesh: всегда несёт его идентификатор.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mesh {mesh_id}: {source}")]
pub struct MeshError {
    pub mesh_id: String,
    #[source]
    pub source: StagError,
}

impl MeshError {
    pub fn new(mesh_id: impl Into<String>, source: StagError) -> Self {
        Self { mesh_id: mesh_id.into(), source }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_errors_are_retryable() {
        assert!(StagError::TransientStore("io".into()).is_retryable());
        assert!(!StagError::Shape("x".into()).is_retryable());
        assert!(!StagError::Format("x".into()).is_retryable());
        assert!(!StagError::NotFound("x".into()).is_retryable());
        assert!(!StagError::Conflict("x".into()).is_retryable());
    }

    #[test]
    fn mesh_error_carries_id_and_kind() {
        let err = MeshError::new("m-1", StagError::Format("bad magic".into()));
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.to_string(), "mesh m-1: format: bad magic");
    }
}
