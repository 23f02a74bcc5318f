pub mod loader;
pub mod queries;

pub use loader::{view_definitions, LoadSummary, StoreLoader};
pub use queries::{AirQualityDatabase, RegionSummary, StationInfo};
