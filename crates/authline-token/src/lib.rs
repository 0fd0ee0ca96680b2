//! Access-token inspection for Authline.
//!
//! The client never validates signatures; that is the server's job. It
//! only needs two facts from an access token: whose it is and when it
//! stops working. This crate reads those out of a JWT payload:
//!
//! - [`decode`]: split, base64url-decode and parse the payload into [`Claims`]
//! - [`is_expired`]: expiry check with a forward skew
//! - [`Clock`]: where "now" comes from ([`SystemClock`], [`ManualClock`])

mod claims;
mod clock;
mod error;

pub use claims::{Claims, decode, is_expired};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TokenError;
