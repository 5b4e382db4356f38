pub mod events;
pub mod feeds;
pub mod pipeline;
