//! Service endpoint: protocol driver and concurrency gate over one
//! connection.
//!
//! One thread (the connection runner) feeds inbound messages to
//! [`ServiceEndpoint::on_message`] serially; every accepted request runs on
//! its own worker thread. The endpoint owns the ready/busy gate, the
//! message-id sequence, request routing, and cancellation. File-channel
//! requests deliberately bypass the single-worker gate so transfers never
//! block the primary worker.

mod registry;
mod state;

pub use registry::{FILE_TARGET, RegistryError, TargetKind, WorkerFactory, WorkerRegistry};
pub use state::{CancelToken, EndpointState, SharedState};

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel::Sender;

use crate::proto::{
    self, Connect, ErrorObject, Outbound, PROTOCOL_VERSION, Request, RequestAck, Status,
    WireResult,
};
use crate::transport::WireFrame;
use crate::worker::file::FileWorker;
use crate::worker::{Worker, WorkerContext};
use crate::store::ContentStore;

pub struct ServiceEndpoint {
    service_name: String,
    registry: WorkerRegistry,
    store: Arc<ContentStore>,
    shared: Arc<SharedState>,
    outbound: Sender<WireFrame>,
    /// Cancellation handle for the current primary-channel worker.
    /// File-channel workers are never tracked here.
    current: Mutex<Option<CancelToken>>,
}

impl ServiceEndpoint {
    pub fn new(
        service_name: impl Into<String>,
        registry: WorkerRegistry,
        store: Arc<ContentStore>,
        outbound: Sender<WireFrame>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            registry,
            store,
            shared: Arc::new(SharedState::new()),
            outbound,
            current: Mutex::new(None),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn state(&self) -> EndpointState {
        self.shared.state()
    }

    /// Announces this service to the coordinator. Called by the connection
    /// runner on every (re)connect.
    pub fn on_open(&self) {
        tracing::info!(service = %self.service_name, "connection open");
        let connect = Outbound::Connect(Connect {
            id: self.shared.allocate_message_id(),
            id_ack: 0,
            service_name: self.service_name.clone(),
            target_types: self.registry.target_types(),
            status: self.shared.state(),
            protocol_version: PROTOCOL_VERSION,
        });
        self.write_outbound(&connect);
    }

    /// Decodes and dispatches one inbound message. Malformed input is
    /// logged and dropped; losing one message is preferable to losing the
    /// connection.
    pub fn on_message(&self, raw: &str) {
        tracing::debug!(len = raw.len(), "inbound message");
        match proto::decode_inbound(raw) {
            Ok(proto::Inbound::ConnectAck {}) => {
                tracing::debug!(service = %self.service_name, "connect acknowledged");
            }
            Ok(proto::Inbound::Request(request)) => self.route(request),
            Ok(proto::Inbound::Cancel {}) => self.cancel_current(),
            Err(err) => {
                tracing::warn!("dropping inbound message: {err}");
            }
        }
    }

    pub fn on_error(&self, error: &dyn std::fmt::Display) {
        tracing::error!(service = %self.service_name, "connection error: {error}");
        self.cancel_current();
    }

    pub fn on_close(&self) {
        tracing::warn!(service = %self.service_name, "connection closed");
        self.cancel_current();
    }

    /// Unsolicited state report to the coordinator.
    pub fn send_status(&self, message: &str) {
        let status = Outbound::Status(Status {
            id: self.shared.allocate_message_id(),
            id_ack: 0,
            status: self.shared.state(),
            message: message.to_string(),
        });
        self.write_outbound(&status);
    }

    /// Routing runs synchronously on the message thread: gate, capability
    /// check, acknowledge, then hand off to a worker thread. The ack is
    /// always queued before the worker starts, and the router itself sends
    /// it; rejections never construct a worker at all.
    fn route(&self, request: Request) {
        match TargetKind::parse(&request.target_type) {
            // File requests bypass the ready/busy gate: the file channel is
            // always available, even while a primary worker runs.
            TargetKind::File => {
                let worker = FileWorker::new(Arc::clone(&self.store));
                self.check_and_dispatch(Box::new(worker), request, TargetKind::File, false);
            }
            TargetKind::Custom(tag) => {
                if self.shared.state() == EndpointState::Busy {
                    self.send_ack(&request, vec![ErrorObject::not_ready(EndpointState::Busy)]);
                    return;
                }
                let Some(factory) = self.registry.resolve(&tag) else {
                    tracing::warn!(target_type = %tag, "request for unregistered target type");
                    self.send_ack(&request, vec![ErrorObject::unsupported_target(&tag)]);
                    return;
                };
                let worker = factory();
                self.check_and_dispatch(worker, request, TargetKind::Custom(tag), true);
            }
        }
    }

    fn check_and_dispatch(
        &self,
        worker: Box<dyn Worker>,
        request: Request,
        target: TargetKind,
        primary: bool,
    ) {
        match worker.can_process(&target, &request.target_value) {
            Ok(()) => {
                self.send_ack(&request, Vec::new());
                if primary && !self.shared.try_set_busy() {
                    // Unreachable in practice: only this thread accepts
                    // primary requests, and the gate was ready above.
                    tracing::warn!(request_id = request.id, "busy flag already set at acceptance");
                }
                self.spawn_worker(worker, request, primary);
            }
            Err(errors) => self.send_ack(&request, errors),
        }
    }

    /// `request_ack` with `result: "success"` when `errors` is empty.
    fn send_ack(&self, request: &Request, errors: Vec<ErrorObject>) {
        let ack = Outbound::RequestAck(RequestAck {
            id: self.shared.allocate_message_id(),
            id_ack: request.id,
            status: self.shared.state(),
            result: if errors.is_empty() {
                WireResult::Success
            } else {
                WireResult::Error
            },
            errors,
        });
        self.write_outbound(&ack);
    }

    fn spawn_worker(&self, mut worker: Box<dyn Worker>, request: Request, primary: bool) {
        let cancel = CancelToken::new();
        if primary {
            let mut current = self.current.lock().expect("current worker lock poisoned");
            *current = Some(cancel.clone());
        }
        let ctx = WorkerContext::new(
            request,
            Arc::clone(&self.shared),
            self.outbound.clone(),
            primary,
        );
        thread::spawn(move || worker.run(&ctx, &cancel));
    }

    /// Advisory cancellation of the current primary worker, plus the state
    /// reset. Idempotent: safe with no worker active, safe if the worker
    /// already finished.
    fn cancel_current(&self) {
        let token = self
            .current
            .lock()
            .expect("current worker lock poisoned")
            .take();
        if let Some(token) = token {
            tracing::info!(service = %self.service_name, "cancelling current worker");
            token.cancel();
        }
        self.shared.set_ready();
    }

    fn write_outbound(&self, message: &Outbound) {
        match proto::encode_outbound(message) {
            Ok(text) => self.write(WireFrame::Text(text)),
            Err(err) => tracing::error!("outbound encoding failed: {err}"),
        }
    }

    /// Pure delegation to the connection runner; no protocol logic here.
    pub fn write(&self, frame: WireFrame) {
        if self.outbound.send(frame).is_err() {
            tracing::debug!("connection runner gone, frame discarded");
        }
    }
}

impl std::fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("service_name", &self.service_name)
            .field("state", &self.shared.state())
            .finish()
    }
}
