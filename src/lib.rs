pub use server::{ConnectorServer, FatalServerError};
pub use udp::UdpTransport;

pub mod app;
pub mod server;
pub mod transport;
pub mod udp;
