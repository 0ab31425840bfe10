//! Outage schedule sources.
//!
//! Each source fetches its provider's proprietary schedule format and
//! normalizes it into the canonical 48-slot [`model::Grid`].

pub mod dtek;
pub mod error;
pub mod http;
pub mod kyiv_digital;
pub mod model;
pub mod source;
pub mod yasno;

pub use error::{ErrorKind, SourceError};
pub use model::{Day, Grid, NormalizedSchedule, PowerState, ProviderId};
pub use source::ScheduleSource;
