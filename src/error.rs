//! Crate-level convenience error: a thin wrapper over the per-capability
//! error enums, not a god error.

use thiserror::Error;

use crate::config::ConfigError;
use crate::endpoint::RegistryError;
use crate::frame::FrameError;
use crate::proto::ProtoError;
use crate::store::StoreError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
