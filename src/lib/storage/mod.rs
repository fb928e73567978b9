mod host;
mod interface;
mod media;

pub use host::{HostStore, HostVolume};
pub use interface::*;
pub use media::{MediaMonitor, MediaState};
