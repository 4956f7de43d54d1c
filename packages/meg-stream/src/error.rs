use thiserror::Error;

use crate::catalog::CatalogError;
use crate::projector::ProjectorError;
use crate::streaming::StreamError;

#[derive(Error, Debug)]
pub enum MegStreamError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Projector(#[from] ProjectorError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MegStreamError>;
