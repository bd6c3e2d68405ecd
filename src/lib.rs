#![forbid(unsafe_code)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod proto;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod worker;

pub use error::{Error, Result};

// Re-export the protocol surface at the crate root for convenience.
pub use crate::endpoint::{
    CancelToken, EndpointState, FILE_TARGET, ServiceEndpoint, SharedState, TargetKind,
    WorkerRegistry,
};
pub use crate::proto::{ErrorObject, PROTOCOL_VERSION, Request};
pub use crate::store::{ContentStore, UrlFetcher};
pub use crate::transport::{WireFrame, WsConnector};
pub use crate::worker::{Worker, WorkerContext, WorkerResponse};
