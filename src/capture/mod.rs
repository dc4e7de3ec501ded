//! # Capture Sessions
//!
//! Everything between a decoded audio message and a named file on disk.
//!
//! ## Session Lifecycle:
//! 1. **ExpectingAudio**: a binary message is decoded, encoded and appended
//!    to a scratch artifact unique to `(connection, sequence)`
//! 2. **ExpectingName**: a text message commits that artifact to
//!    `<output-dir>/<name>.wav` with a single rename
//! 3. Back to **ExpectingAudio** for the next session on the same connection
//!
//! One audio message per session: a second audio message before the name is
//! rejected rather than appended.

pub mod commit;
pub mod scratch;
pub mod session;
pub mod store;

pub use session::{CaptureSession, ClientMessage, SessionEvent};
pub use store::CaptureStore;
