pub mod connector;
pub mod tokio_client;

pub use connector::SshConnector;
