//! Call lifecycle: per-attempt state, unary orchestration, and streams.

mod state;
mod stream;
mod unary;

pub use state::{CallContext, CallKind, CallParams, CallState, SpanMode, Stage};
pub use stream::InputStream;
pub use unary::UnaryResponse;

pub(crate) use unary::UnaryCall;
