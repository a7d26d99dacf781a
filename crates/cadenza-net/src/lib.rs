//! Network collaborator for chunk loading.
//!
//! [`Net`] abstracts byte fetches so loaders can run against the reqwest-backed
//! [`HttpClient`], a [`TimeoutNet`] decorator, or an in-memory fake in tests.
//! [`DataSpec`] names what to fetch and [`TransferListener`] observes every
//! transfer.

#![forbid(unsafe_code)]

mod client;
mod error;
mod timeout;
mod traits;
mod transfer;
mod types;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    timeout::TimeoutNet,
    traits::{ByteStream, Net, NetExt},
    transfer::{TransferListener, TransferListeners},
    types::{DataSpec, Headers, NetOptions, RangeSpec},
};
