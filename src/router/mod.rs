//! Router static DNS REST API
//!
//! A thin typed layer over the router's `/rest/ip/dns/static` endpoint and
//! the lookup helpers the reconcilers use on its listing.

mod client;
mod lookup;
mod types;

pub use client::*;
pub use lookup::*;
pub use types::*;
