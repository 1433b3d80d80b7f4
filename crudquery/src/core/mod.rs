// Execution boundary: the only async surface of the crate

pub mod traits;

pub use traits::{ListResponse, QueryExecutor, SeaOrmExecutor, get_many};
