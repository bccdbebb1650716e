pub mod protocol;
pub mod session;
pub mod tls;
pub mod transport;
