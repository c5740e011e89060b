use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to open application database: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Failed to initialize user store: {0}")]
    Users(#[source] anyhow::Error),

    #[error("Failed to initialize query history: {0}")]
    History(#[source] anyhow::Error),

    #[error("Failed to initialize vector store: {0}")]
    VectorStore(#[source] anyhow::Error),

    #[error("Failed to build pipeline collaborators: {0}")]
    Collaborators(#[source] anyhow::Error),
}
