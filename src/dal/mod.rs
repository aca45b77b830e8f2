pub mod artifact_db;
pub mod keyword_db;
pub mod tracking_db;
