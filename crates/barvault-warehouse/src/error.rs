use barvault_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("connection pool unavailable: {0}")]
    Pool(String),

    #[error("corrupt row for {symbol}: {detail}")]
    CorruptRow { symbol: String, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<WarehouseError> for StoreError {
    fn from(value: WarehouseError) -> Self {
        match value {
            WarehouseError::Store(inner) => inner,
            WarehouseError::Pool(message) => StoreError::Unavailable(message),
            WarehouseError::Io(err) => StoreError::Unavailable(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
