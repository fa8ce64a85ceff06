/// Knowledge base: categories, posts, comments, endorsements, and feeds
pub mod categories;
pub mod feed;
pub mod posts;

pub use categories::{CategoryManager, KnowledgeCategory};
pub use feed::{FeedEntry, FeedManager};
pub use posts::{Comment, KnowledgePost, PostManager};
