pub mod channels;
pub mod connection;
pub mod handoff;
pub mod rate_limiter;
pub mod server;
pub mod telnet;

pub use channels::{EventRx, EventTx, NetEvent, ResumedSession};
pub use connection::{spawn_connection, Announce};
pub use rate_limiter::{ConnectionLimiter, ConnectionPermit, RateLimitConfig, SharedLimiter};
pub use server::{adopt_session, run_accept_loop, TelnetListener};
pub use telnet::{Frame, Framer, FramerError, Intent, Negotiation, MAX_LINE_LEN};
