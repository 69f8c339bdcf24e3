//! Message and MessageHandler
//!
//! Every rpc a ring member serves is one variant of [Message], answered by one
//! [MessageReport]. The encoding is plain serde, so any transport carrying JSON can
//! move them; the node daemon uses JSON-RPC where `method` and `params` map directly
//! onto the tagged representation.

pub mod types;
pub use types::*;

pub mod handlers;
pub use handlers::HandleMsg;
