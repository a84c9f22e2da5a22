pub mod datamodel;
pub mod error;
pub mod field;
pub mod hashid;
pub mod oino_id;
pub mod ports;
pub mod sql_params;
