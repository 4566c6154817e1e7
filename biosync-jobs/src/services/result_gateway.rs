//! Read-side access to stored results

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::job_store::{JobStore, StoreError};
use super::result_parser::{self, ParseError};
use crate::models::{IdentifierError, JobId, JobKind, ResultPayload};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid job identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("no {kind} result for job {id}")]
    NotFound { kind: JobKind, id: JobId },

    #[error("stored {kind} result for job {id} is malformed")]
    MalformedResult {
        kind: JobKind,
        id: JobId,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Store(StoreError),
}

#[derive(Clone)]
pub struct ResultGateway {
    store: Arc<JobStore>,
}

impl ResultGateway {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Load and sanitize a stored result. Never mutates storage.
    pub async fn fetch(&self, kind: JobKind, id: &str) -> Result<ResultPayload, FetchError> {
        let id = JobId::parse(id)?;

        let bytes = self.store.read(kind, &id).await.map_err(|e| match e {
            StoreError::NotFound { kind, id } => FetchError::NotFound { kind, id },
            other => FetchError::Store(other),
        })?;

        let text = String::from_utf8_lossy(&bytes);
        match result_parser::parse(&text) {
            Ok(payload) => {
                debug!(job_id = %id, kind = %kind, "Result served");
                Ok(payload)
            }
            Err(source) => {
                warn!(job_id = %id, kind = %kind, error = %source, "Stored result is malformed");
                Err(FetchError::MalformedResult { kind, id, source })
            }
        }
    }
}
