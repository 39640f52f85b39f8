pub mod config;
pub mod error;
pub mod networking;
pub mod orchestrator;
pub mod provisioner;
pub mod resolver;
pub mod retriever;
pub mod rpc_client;
pub mod service;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use error::{JobError, ServiceError};
pub use service::ServiceContext;
