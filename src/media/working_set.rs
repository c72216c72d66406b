use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::media::item::{AppliedFeature, MediaItem};
use crate::settings::WatermarkSettings;

/// The media items currently selected, in insertion order
#[derive(Debug, Default)]
pub struct WorkingSet {
    items: HashMap<Uuid, MediaItem>,
    order: Vec<Uuid>,
}

fn unknown(id: Uuid) -> crate::error::StudioError {
    PipelineError::UnknownItem { id: id.to_string() }.into()
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: MediaItem) -> Uuid {
        let id = item.id();
        self.order.push(id);
        self.items.insert(id, item);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&MediaItem> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut MediaItem> {
        self.items.get_mut(&id)
    }

    /// Remove an item, dropping its result and every handle derived from it
    pub fn remove(&mut self, id: Uuid) -> Option<MediaItem> {
        let item = self.items.remove(&id)?;
        self.order.retain(|other| *other != id);
        debug!("Removed item {} ({})", id, item.file_name());
        Some(item)
    }

    /// Items in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = &MediaItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Update one watermark layer, addressed by item and order
    pub fn update_watermark(&mut self, id: Uuid, order: u32, settings: WatermarkSettings) -> Result<()> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| unknown(id))?
            .update_watermark(order, settings)
    }

    /// Remove one applied feature, addressed by item and order
    pub fn remove_feature(&mut self, id: Uuid, order: u32) -> Result<AppliedFeature> {
        self.items.get_mut(&id).ok_or_else(|| unknown(id))?.remove_feature(order)
    }
}
