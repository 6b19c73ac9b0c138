pub mod client;
pub mod countries;
pub mod display;
pub mod geocoder;
pub mod map;
pub mod narrator;
pub mod session;
pub mod types;

pub use client::{ClientConfig, LiveSession, connect};
pub use display::{DisplayState, FieldId, Flag};
pub use map::{MapSurface, MapView, Marker};
pub use session::{Alert, CommitPolicy, LookupOutcome, LookupSession, SessionSnapshot};
pub use types::{Address, Coordinate, CountryInfo, Fact, SENTINEL};
