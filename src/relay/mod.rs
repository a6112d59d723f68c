//! TCP relay between clamd clients and the backend daemon
//!
//! - `server`: accepts client connections
//! - `proxy`: pairs each client with a backend connection
//! - `session`: relays both directions and applies the command filter
//! - `backend`: dials the backend daemon
//! - `conn_error`: decides how loudly a relay error is logged

mod backend;
mod conn_error;
mod proxy;
mod server;
mod session;

pub use backend::{Backend, DEFAULT_CONNECT_TIMEOUT};
pub use conn_error::{ConnectionStatus, classify, classify_io_error, is_connection_closed};
pub use proxy::Proxy;
pub use server::Server;
pub use session::{CommandStats, ProxySession, SessionContext, SessionSummary};
