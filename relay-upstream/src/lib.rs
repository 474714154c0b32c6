pub mod envelope;
pub mod session;
pub mod transport;

pub use envelope::{decode_envelope, route, Route, SocketData};
pub use session::{Session, SessionChannels, SessionEvent};
