//! modrpc - Protocol Types
//!
//! Wire-level types shared by the transport and the server: the response
//! envelopes, the error value a module method fails with, positional
//! payload decoding and the module descriptors returned by schema queries.

pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod wire;

pub use descriptor::{MethodDescriptor, ModuleDescriptor, ReturnShape};
pub use envelope::{ExceptionEnvelope, ExceptionInfo, ResultEnvelope};
pub use error::ModuleError;
pub use payload::{PayloadError, decode_positional};
