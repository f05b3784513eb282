//! ember-client — server channel boundary and fraction fetching.
//!
//! The core pipeline talks to the server through the [`ServerChannel`]
//! trait; [`HttpChannel`] is the production implementation over a single
//! TCP connection. [`fetch_all`] drives either transport mode and returns
//! the complete, unordered fraction set or nothing at all.

pub mod channel;
pub mod fetch;
pub mod http;

pub use channel::{ChannelError, Manifest, ServerChannel};
pub use fetch::{fetch_all, FetchError};
pub use http::HttpChannel;
