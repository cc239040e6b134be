pub mod dynamodb;
pub mod dynamodb_store;
pub mod http_store;
pub mod memory_store;
pub mod repository;
pub mod store;

pub use dynamodb::*;
pub use dynamodb_store::*;
pub use http_store::*;
pub use memory_store::*;
pub use repository::*;
pub use store::*;
