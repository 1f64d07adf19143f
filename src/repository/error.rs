#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Internal database error: {0}")]
    BackendError(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to prepare database file: {0}")]
    Io(#[from] std::io::Error),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }

    pub(crate) fn is_foreign_key_violation(&self) -> bool {
        match self {
            RepositoryError::BackendError(sqlx::Error::Database(e)) => e.is_foreign_key_violation(),
            _ => false,
        }
    }
}
