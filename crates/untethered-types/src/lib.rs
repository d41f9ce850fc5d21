pub mod command;
pub mod connection;
pub mod event;
pub mod ids;
pub mod message;
pub mod session;

pub use command::*;
pub use connection::*;
pub use event::*;
pub use ids::*;
pub use message::*;
pub use session::*;
