pub mod rdns;

pub use rdns::{DnsLookup, Resolve};
