pub mod admission;
pub mod commands;
pub mod names;
pub mod restart;
pub mod server;
pub mod systems;
pub mod world;

pub use admission::{Admission, AdmissionOutcome, AdmissionSettings};
pub use commands::{parse_command, Command, CommandOutcome, ADMIN_LEVEL};
pub use names::{title_case, NameRules, StandardNameRules};
pub use restart::{RestartCoordinator, RestartError};
pub use server::{MudServer, ServerSettings};
pub use systems::WorldSystems;
pub use world::{Actor, Room, RoomId, World};
