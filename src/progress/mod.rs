//! Pull progress: decoding, session lifecycle and the per-model registry.

pub mod bus;
pub mod decoder;
pub mod event;
pub mod registry;
pub mod session;
pub mod transport;
pub mod wire;

pub use bus::PullBus;
pub use decoder::{Record, StreamDecoder};
pub use event::{format_bytes, ProgressEvent, PullUpdate, SessionState};
pub use registry::PullRegistry;
pub use session::{PullSession, SessionHandle};
pub use transport::{Frame, PushEvent, Transport, TransportKind};
