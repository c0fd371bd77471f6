//! Wire-level protocol types shared between the Kagan core daemon and its
//! clients: the request/response envelope, capability profiles and session
//! lanes, the authorization policy table, and the error code taxonomy.
//!
//! Nothing in this crate talks to the filesystem, a socket, or a database —
//! it is pure data plus the policy tables the dispatcher and session binding
//! layers consult.

pub mod authz;
pub mod error;
pub mod session;
pub mod wire;

pub use authz::{AuthorizationError, AuthorizationPolicy, CapabilityProfile};
pub use error::{ErrorCode, ProtocolError};
pub use session::{SessionBindingError, SessionNamespace, SessionOrigin};
pub use wire::{Request, Response, ResponseError};
