pub mod feed;
pub mod repository;

pub use repository::{NewPost, ReactionCount, ReactionSummary};
