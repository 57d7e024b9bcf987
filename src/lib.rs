pub mod cli;
pub mod remote;
pub mod ssh;
pub mod utils;

pub use cli::Cli;
pub use remote::{Executor, ExecutorConfig};
pub use ssh::SshConnector;
