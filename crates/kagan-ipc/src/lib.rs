//! Everything a running daemon needs to accept connections and answer
//! requests: the socket transport (§4.1, §6), session binding and
//! task-scope enforcement (§4.4), the idempotency cache and dispatcher
//! (§4.5), and one service module per capability family (§4.6–§4.15).
//!
//! Nothing outside this crate talks to a socket directly — `kagan-daemon`
//! only owns the accept loop and wires a fresh [`dispatcher::Dispatcher`]
//! per process.

pub mod dispatcher;
pub mod idempotency;
pub mod services;
pub mod session_binding;
pub mod transport;

pub use dispatcher::Dispatcher;

/// Every service handler's return type: authorized params in, a JSON result
/// or a typed protocol error out.
pub type ServiceResult = Result<serde_json::Value, kagan_protocol::ProtocolError>;
