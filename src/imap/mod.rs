mod client;
mod connection;
mod error;
mod fetch;
mod session;

pub use client::Client;
pub use client::LoginError;
pub use connection::Connection;
#[cfg(test)]
pub use connection::mock_connection::MockConnection;
pub use error::ImapError;
pub use fetch::FetchItem;
pub use session::MessageInfo;
pub use session::Selection;
#[cfg(test)]
pub use session::SelectionBuilder;
pub use session::Session;
