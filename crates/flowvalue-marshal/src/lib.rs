//! Value marshalling between a host and a flow runtime.
//!
//! Host values ([`HostValue`]) are encoded into 16-byte tagged slots inside
//! the runtime's linear memory, and slots are decoded back into host values
//! together with their value-type name ([`ValueWithType`]). Structured
//! values (arrays and records) follow the shapes recorded in the
//! [`TypeCatalog`](flowvalue_types::TypeCatalog); opaque host resources
//! cross the boundary as integer handles from a [`ResourceHandleTable`].
//!
//! A [`MarshalSession`] owns the per-session state (catalog, handle table,
//! diagnostics) and is the usual entry point:
//!
//! ```ignore
//! let mut session = MarshalSession::from_assets_json(assets_json)?;
//! let slot = session.encode(&mut runtime, &HostValue::from("hello"), None)?;
//! let decoded = session.decode(&runtime, slot);
//! assert_eq!(decoded.value_type, "string");
//! ```
//!
//! Encoding never fails on value shape: unsupported or mismatched values are
//! logged as diagnostics and replaced by `Null`. Decoding never fails at all.

pub mod decode;
pub mod diagnostics;
pub mod encode;
pub mod error;
pub mod handles;
pub mod host;
pub mod object_type;
pub mod session;
mod shape;
pub mod staging;

pub use decode::{Decoder, MAX_DECODE_DEPTH};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, MAX_DIAGNOSTICS};
pub use encode::Encoder;
pub use error::{MarshalError, MarshalResult};
pub use handles::{ResourceHandle, ResourceHandleTable};
pub use host::{HostValue, Resource, ValueWithType};
pub use object_type::{FieldValueType, ObjectVariableType, ValueFieldDescription};
pub use session::MarshalSession;
pub use staging::{ArrayValue, StagedValue, Stager};
