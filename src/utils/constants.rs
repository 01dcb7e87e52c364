// src/utils/constants.rs

/// Canonical value of `Set` that yields to any more specific category.
pub const DEFAULT_SET: &str = "PP";

/// Canonical value of `Fueltype` that yields to any more specific fuel.
pub const DEFAULT_FUELTYPE: &str = "Other";

/// Worker limit when `PROCESS_LIMIT` is not set.
pub const DEFAULT_PROCESS_LIMIT: usize = 4;

/// Separator of id sets inside a single CSV cell.
pub const ID_SEPARATOR: char = ';';
