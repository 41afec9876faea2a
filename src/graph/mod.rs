pub mod domain;
pub mod repository;

pub use domain::{friendship, Friendship, RelationError, RelationList, RelationOp, Relations};
pub use repository::{DynGraphRepository, GraphError, GraphRepository, SqliteGraphRepository};
