pub mod compression;
pub mod csv;
pub mod parquet;
