pub mod aggregation;
pub mod names;
pub mod technology;

pub use aggregation::{aggregate_units, find_unit_groups, AggregationOptions};
pub use names::clean_powerplant_names;
pub use technology::{clean_technology, normalize_technology};
