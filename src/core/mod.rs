pub mod api;
pub mod collector;
pub mod doctor;
pub mod ent;
pub mod error;
pub mod format;
pub mod logger;
pub mod normalize;
pub mod poller;
pub mod rpc;
pub mod view;
pub use api::{KomariClient, UpstreamMode};
pub use collector::Collector;
pub use doctor::*;
pub use ent::*;
pub use error::*;
pub use logger::Logger;
pub use poller::{Event, Poller};
