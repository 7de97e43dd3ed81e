//! Link subsystem: the bidirectional streaming connection to the server

pub mod dispatcher;
pub mod session;
pub mod transport;

pub use session::LinkSession;
pub use transport::{LinkEvent, LinkTransport, WsTransport};
