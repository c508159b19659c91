pub mod config;
pub mod convert;
pub mod ingest;
pub mod merge;
pub mod output;
pub mod process;
