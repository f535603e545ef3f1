pub mod data_url;
pub mod snowflake;
pub mod validation;
