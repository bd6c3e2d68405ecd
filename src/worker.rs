//! Worker capability contract and response emission.
//!
//! A worker is bound to exactly one accepted request. The endpoint checks
//! feasibility inline with [`Worker::can_process`], acknowledges the
//! request itself, then hands the worker to a dedicated thread where
//! [`Worker::run`] emits one or more responses through its
//! [`WorkerContext`].

pub mod file;

use std::sync::Arc;

use crossbeam::channel::Sender;
use serde_json::Value;

use crate::endpoint::{CancelToken, SharedState, TargetKind};
use crate::frame;
use crate::proto::{self, ErrorObject, Outbound, ResponseEnvelope, WireResult};
use crate::transport::WireFrame;

pub trait Worker: Send {
    /// Side-effect-free feasibility check. Evaluated inline during routing,
    /// before the acknowledgement, so it must not block beyond a quick
    /// bounded probe.
    fn can_process(&self, target: &TargetKind, value: &str) -> Result<(), Vec<ErrorObject>>;

    /// Executes the request. Runs on its own thread and may block
    /// arbitrarily; long-running work should check `cancel` at natural
    /// yield points and bail out early once it is set.
    fn run(&mut self, ctx: &WorkerContext, cancel: &CancelToken);
}

/// One result emission. `last` defaults to true; multi-part workers mark
/// every emission but the final one with [`WorkerResponse::partial`].
#[derive(Clone, Debug, Default)]
pub struct WorkerResponse {
    service_data: Option<Value>,
    files: Vec<String>,
    binary: Vec<u8>,
    errors: Vec<ErrorObject>,
    last: bool,
    success: bool,
}

impl WorkerResponse {
    /// Structured JSON result.
    pub fn data(service_data: Value) -> Self {
        Self {
            service_data: Some(service_data),
            last: true,
            success: true,
            ..Self::default()
        }
    }

    /// Structured JSON result referencing stored files.
    pub fn data_with_files(service_data: Value, files: Vec<String>) -> Self {
        Self {
            files,
            ..Self::data(service_data)
        }
    }

    /// Raw payload, sent as one length-prefixed binary frame.
    pub fn binary(payload: Vec<u8>) -> Self {
        Self {
            binary: payload,
            last: true,
            success: true,
            ..Self::default()
        }
    }

    /// Failed execution. Always degrades to a JSON text message.
    pub fn failure(errors: Vec<ErrorObject>) -> Self {
        Self {
            errors,
            last: true,
            success: false,
            ..Self::default()
        }
    }

    /// Marks this emission as an intermediate one: the endpoint stays busy
    /// and the envelope carries `complete: false`.
    pub fn partial(mut self) -> Self {
        self.last = false;
        self
    }
}

/// Emission handle held by a worker for the lifetime of one request. Holds
/// shared endpoint state by reference-counted handle, never ownership of
/// the endpoint itself.
pub struct WorkerContext {
    request: proto::Request,
    shared: Arc<SharedState>,
    outbound: Sender<WireFrame>,
    primary: bool,
}

impl WorkerContext {
    pub(crate) fn new(
        request: proto::Request,
        shared: Arc<SharedState>,
        outbound: Sender<WireFrame>,
        primary: bool,
    ) -> Self {
        Self {
            request,
            shared,
            outbound,
            primary,
        }
    }

    pub fn request(&self) -> &proto::Request {
        &self.request
    }

    /// Builds and sends one response envelope. Failures here are logged and
    /// swallowed: a malformed or unwritable response must never take down
    /// the worker thread or the connection's message loop.
    pub fn respond(&self, response: WorkerResponse) {
        if let Err(err) = self.try_respond(response) {
            tracing::error!(
                request_id = self.request.id,
                target_type = %self.request.target_type,
                "response emission failed: {err}"
            );
        }
    }

    fn try_respond(&self, response: WorkerResponse) -> Result<(), EmitError> {
        // The ready transition must be visible before the final message is
        // sent, so a caller that immediately issues a new request observes a
        // consistent state. File-channel responses run outside the
        // ready/busy machine and leave it untouched.
        if response.last && self.primary {
            self.shared.set_ready();
        }

        let mut envelope = ResponseEnvelope {
            id: self.shared.allocate_message_id(),
            id_ack: self.request.id,
            target_type: self.request.target_type.clone(),
            target_value: self.request.target_value.clone(),
            status: self.shared.state(),
            complete: response.last,
            file_id: None,
            result: if response.success {
                WireResult::Success
            } else {
                WireResult::Error
            },
            service_data: None,
            files: None,
            errors: None,
        };
        if self.request.target_type == crate::endpoint::FILE_TARGET {
            envelope.file_id = Some(self.request.target_value.clone());
        }

        let frame = if response.success {
            if let Some(service_data) = response.service_data {
                envelope.service_data = Some(service_data);
                envelope.files = Some(response.files);
                WireFrame::Text(proto::encode_outbound(&Outbound::Response(envelope))?)
            } else if !response.binary.is_empty() {
                let metadata = proto::encode_outbound(&Outbound::Response(envelope))?;
                WireFrame::Binary(frame::encode(metadata.as_bytes(), &response.binary)?)
            } else {
                WireFrame::Text(proto::encode_outbound(&Outbound::Response(envelope))?)
            }
        } else {
            envelope.errors = Some(response.errors);
            WireFrame::Text(proto::encode_outbound(&Outbound::Response(envelope))?)
        };

        self.outbound.send(frame).map_err(|_| EmitError::Closed)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum EmitError {
    #[error(transparent)]
    Proto(#[from] proto::ProtoError),
    #[error(transparent)]
    Frame(#[from] frame::FrameError),
    #[error("connection closed, response discarded")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointState;
    use crossbeam::channel::unbounded;

    fn context(target_type: &str, primary: bool) -> (WorkerContext, crossbeam::channel::Receiver<WireFrame>) {
        let (tx, rx) = unbounded();
        let ctx = WorkerContext::new(
            proto::Request {
                id: 42,
                target_type: target_type.to_string(),
                target_value: "doc-1".to_string(),
            },
            Arc::new(SharedState::new()),
            tx,
            primary,
        );
        (ctx, rx)
    }

    fn parse_text(frame: WireFrame) -> serde_json::Value {
        match frame {
            WireFrame::Text(text) => serde_json::from_str(&text).unwrap(),
            WireFrame::Binary(_) => panic!("expected text frame"),
        }
    }

    #[test]
    fn final_response_resets_primary_channel_to_ready() {
        let (ctx, rx) = context("scan", true);
        ctx.shared.try_set_busy();

        ctx.respond(WorkerResponse::data(serde_json::json!({"ok": true})));

        assert_eq!(ctx.shared.state(), EndpointState::Ready);
        let json = parse_text(rx.try_recv().unwrap());
        assert_eq!(json["type"], "response");
        assert_eq!(json["id_ack"], 42);
        assert_eq!(json["complete"], true);
        assert_eq!(json["status"], "ready");
    }

    #[test]
    fn partial_response_keeps_the_endpoint_busy() {
        let (ctx, rx) = context("scan", true);
        ctx.shared.try_set_busy();

        ctx.respond(WorkerResponse::data(serde_json::json!({"page": 1})).partial());

        assert_eq!(ctx.shared.state(), EndpointState::Busy);
        let json = parse_text(rx.try_recv().unwrap());
        assert_eq!(json["complete"], false);
        assert_eq!(json["status"], "busy");
    }

    #[test]
    fn file_channel_completion_leaves_state_alone() {
        let (ctx, rx) = context("file", false);
        ctx.shared.try_set_busy();

        ctx.respond(WorkerResponse::binary(b"payload".to_vec()));

        assert_eq!(ctx.shared.state(), EndpointState::Busy);
        let WireFrame::Binary(bytes) = rx.try_recv().unwrap() else {
            panic!("expected binary frame");
        };
        let (meta, payload) = frame::split(&bytes).unwrap();
        let json: serde_json::Value = serde_json::from_slice(meta).unwrap();
        assert_eq!(json["file_id"], "doc-1");
        assert_eq!(json["result"], "success");
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn failure_degrades_to_text_even_for_file_targets() {
        let (ctx, rx) = context("file", false);

        ctx.respond(WorkerResponse::failure(vec![ErrorObject::not_found("doc-1")]));

        let json = parse_text(rx.try_recv().unwrap());
        assert_eq!(json["result"], "error");
        assert_eq!(json["errors"][0]["code"], 1);
        assert_eq!(json["errors"][0]["message"], "File doc-1 is not found.");
    }

    #[test]
    fn emission_to_a_dead_connection_is_swallowed() {
        let (ctx, rx) = context("scan", true);
        drop(rx);
        // Must not panic; the error is logged and discarded.
        ctx.respond(WorkerResponse::data(serde_json::json!({})));
    }
}
