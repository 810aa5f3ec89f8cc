pub mod content_chunks;
pub mod link_status;
pub mod resources;

// Re-export entities for convenience
pub use content_chunks::{
    ActiveModel as ContentChunkActiveModel, Entity as ContentChunk, Model as ContentChunkModel,
};
pub use link_status::{
    ActiveModel as LinkStatusActiveModel, Entity as LinkStatus, Model as LinkStatusModel,
};
pub use resources::{
    ActiveModel as ResourceActiveModel, Entity as ResourceEntity, Model as ResourceModel,
};
