pub mod character;
pub mod credential;
pub mod db;
pub mod error;
pub mod room;
mod schema;

pub use character::{CharacterRecord, CharacterRepo};
pub use credential::{hash_credential, verify_credential};
pub use db::WorldDb;
pub use error::WorldDbError;
pub use room::{RoomRecord, RoomRepo};
