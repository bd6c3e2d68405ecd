//! File channel worker: serves previously stored blobs by name.

use std::sync::Arc;

use crate::endpoint::{CancelToken, TargetKind};
use crate::proto::ErrorObject;
use crate::store::{ContentStore, StoreError};
use crate::worker::{Worker, WorkerContext, WorkerResponse};

pub struct FileWorker {
    store: Arc<ContentStore>,
}

impl FileWorker {
    pub fn new(store: Arc<ContentStore>) -> Self {
        Self { store }
    }
}

impl Worker for FileWorker {
    fn can_process(&self, _target: &TargetKind, value: &str) -> Result<(), Vec<ErrorObject>> {
        if self.store.has(value) {
            Ok(())
        } else {
            Err(vec![ErrorObject::not_found(value)])
        }
    }

    // Reads are treated as atomic and fast relative to cancellation
    // latency, so the token is never consulted mid-read.
    fn run(&mut self, ctx: &WorkerContext, _cancel: &CancelToken) {
        let name = ctx.request().target_value.clone();
        match self.store.read(&name) {
            Ok(bytes) => ctx.respond(WorkerResponse::binary(bytes)),
            Err(StoreError::NotFound { .. }) => {
                // The blob vanished between the capability check and the read.
                ctx.respond(WorkerResponse::failure(vec![ErrorObject::not_found(&name)]));
            }
            Err(err) => {
                tracing::error!(file_id = %name, "stored blob read failed: {err}");
                ctx.respond(WorkerResponse::failure(vec![ErrorObject {
                    code: ErrorObject::NOT_FOUND,
                    message: err.to_string(),
                }]));
            }
        }
    }
}
