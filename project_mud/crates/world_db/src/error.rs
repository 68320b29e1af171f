use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldDbError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cannot prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("character name already taken: {0}")]
    CharacterNameTaken(String),

    #[error("character not found: {0}")]
    CharacterNotFound(String),

    #[error("invalid credential")]
    InvalidCredential,

    #[error("credential hashing error: {0}")]
    HashError(String),

    #[error("world has no rooms")]
    EmptyWorld,
}
