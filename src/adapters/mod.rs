pub mod panel;
pub mod playlist;
pub mod traits;

pub use panel::PanelAdapter;
pub use playlist::PlaylistAdapter;
pub use traits::{ItemBatch, SourceAdapter};

use std::sync::Arc;

use crate::config::Config;
use crate::error::SyncError;
use crate::models::{Resource, ResourceKind};

/// Build the adapter matching a resource's kind
pub fn create_adapter(
    resource: &Resource,
    config: &Config,
) -> Result<Arc<dyn SourceAdapter>, SyncError> {
    match resource.kind {
        ResourceKind::Playlist => Ok(Arc::new(PlaylistAdapter::new(
            resource.source_url.clone(),
            config,
        )?)),
        ResourceKind::Panel => {
            let credentials = resource.credentials.as_ref().ok_or_else(|| {
                SyncError::Authentication("Panel resource has no credentials".to_string())
            })?;
            Ok(Arc::new(PanelAdapter::new(credentials, config)?))
        }
    }
}
