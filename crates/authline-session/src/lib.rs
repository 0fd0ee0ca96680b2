//! Client session state for Authline.
//!
//! This crate owns the answer to "is anyone signed in, and who?":
//!
//! 1. **State machine**: [`SessionState`] moves between
//!    [`SessionStatus::Anonymous`], `Authenticating`, `Authenticated` and
//!    `Refreshing`, and is the only writer of the credential store.
//! 2. **Observers**: UI code subscribes to status changes
//!    ([`SessionState::subscribe`]).
//! 3. **Single-flight**: [`SingleFlight`] lets concurrent callers share
//!    one login or refresh instead of racing.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher / SessionClient (above)  ← drive transitions, read credentials
//!     ↕
//! Session Layer (this crate)  ← state, observers, flights
//!     ↕
//! Store + Token Inspector (below)  ← persistence, claim decoding
//! ```

mod error;
mod flight;
mod state;
mod status;

pub use error::SessionError;
pub use flight::{Flight, FlightLeader, Join, SingleFlight};
pub use state::{SessionState, SubscriptionId};
pub use status::{ErrorKind, OperationKind, SessionSnapshot, SessionStatus};
