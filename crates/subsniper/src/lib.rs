//! Passive subdomain discovery: search engine results are mined for hostnames
//! under a target domain, and every candidate is confirmed with an A lookup.

pub mod config;
pub mod dns;
mod error;
pub mod model;
pub mod scan;
pub mod search;
pub mod subdomains;

pub use error::{Error, Result};
pub use scan::{enumerate, EnumerationReport, Enumerator};
