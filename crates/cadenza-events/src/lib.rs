#![forbid(unsafe_code)]

//! Event bus for cadenza playback sessions.

mod abr;
mod bus;
mod dispatcher;
mod event;
mod load;

pub use abr::AbrEvent;
pub use bus::EventBus;
pub use dispatcher::MediaEventDispatcher;
pub use event::{BandwidthEvent, Event};
pub use load::{LoadEvent, LoadTarget};
