use stag_api::{ErrorKind, MeshError, StagError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("anchor {anchor_id}: {source}")]
    Anchor { anchor_id: String, source: StagError },

    #[error(transparent)]
    Mesh(#[from] MeshError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Anchor { source, .. } => source.kind(),
            PipelineError::Mesh(e) => e.kind(),
        }
    }
}
