pub mod closure;
pub mod combine;
pub mod extend;
pub mod manager;
pub mod pairwise;
pub mod reduce;

pub use closure::cross_matches;
pub use combine::combine_datasets;
pub use extend::extend_by_non_matched;
pub use manager::{
    aggregate_datasets, combine_multiple_datasets, link_multiple_datasets, run_on_pool_runtime,
    PoolOptions,
};
pub use pairwise::{best_matches, compare_two_datasets};
pub use reduce::{reduce_matched_table, reliability_ranking};
