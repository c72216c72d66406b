use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::pipeline::features::{RemoteFeature, WatermarkFeature};
use crate::pipeline::stage::FeatureHandler;
use crate::remote::OptimizationService;

/// Registry of feature handlers by feature id
///
/// The watermark feature is always present; the remote features are
/// registered when a remote service is available.
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    handlers: HashMap<String, Arc<dyn FeatureHandler>>,
}

impl FeatureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in features
    pub fn with_builtin(watermark: WatermarkFeature, service: Option<Arc<dyn OptimizationService>>) -> Self {
        let mut registry = Self::new();

        match &service {
            Some(service) => registry.register(Arc::new(watermark.with_service(service.clone()))),
            None => registry.register(Arc::new(watermark)),
        }

        if let Some(service) = service {
            registry.register(Arc::new(RemoteFeature::convert(service.clone())));
            registry.register(Arc::new(RemoteFeature::remove_background(service.clone())));
            registry.register(Arc::new(RemoteFeature::optimize(service)));
        }

        registry
    }

    /// Register a handler under its own feature id, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn FeatureHandler>) {
        self.handlers.insert(handler.feature_id().to_string(), handler);
    }

    pub fn get(&self, feature_id: &str) -> Result<Arc<dyn FeatureHandler>> {
        self.handlers.get(feature_id).cloned().ok_or_else(|| {
            PipelineError::UnknownFeature {
                feature_id: feature_id.to_string(),
            }
            .into()
        })
    }

    pub fn has_feature(&self, feature_id: &str) -> bool {
        self.handlers.contains_key(feature_id)
    }

    /// Registered feature ids, sorted
    pub fn feature_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
