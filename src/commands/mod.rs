//! CLI commands implementation

pub mod ingest;
pub mod init;
pub mod search;
pub mod status;

pub use ingest::*;
pub use init::*;
pub use search::*;
pub use status::*;
