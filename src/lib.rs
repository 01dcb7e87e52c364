pub mod cleaning;
pub mod errors;
pub mod matching;
pub mod models;
pub mod scoring;
pub mod utils;
