pub mod connection;
mod transport;

pub use connection::{Connection, ConnectionInfo, ConnectionSender};
pub use transport::Transport;
