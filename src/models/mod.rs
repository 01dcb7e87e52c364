pub mod aggregation;
pub mod core;
pub mod matching;
pub mod stats_models;

pub use self::aggregation::Aggregation;
pub use self::core::{Dataset, Field, FieldKind, FieldValue, PowerPlant};
pub use self::matching::{
    CanonicalPlant, CorrespondenceTable, LinkTable, MatchedRow, MatchedTable, SimilarityLink,
};
