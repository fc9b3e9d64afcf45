pub mod ddl;
pub mod instances;
pub mod metadata;
pub mod processes;
pub mod users;
