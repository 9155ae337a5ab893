pub mod bulletin;
pub mod rss;
