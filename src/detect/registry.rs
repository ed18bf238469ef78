use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::adapter::DetectorAdapter;

/// Detector adapters in registration order.
///
/// Registration order is the order fused detections come out in.
#[derive(Debug, Default)]
pub struct DetectorRegistry {
    adapters: Vec<Arc<DetectorAdapter>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Ids must be unique.
    pub fn register(&mut self, adapter: DetectorAdapter) -> Result<()> {
        if self.get(adapter.id()).is_some() {
            return Err(anyhow!("detector '{}' already registered", adapter.id()));
        }
        self.adapters.push(Arc::new(adapter));
        Ok(())
    }

    /// Get adapter by id.
    pub fn get(&self, id: &str) -> Option<Arc<DetectorAdapter>> {
        self.adapters.iter().find(|a| a.id() == id).cloned()
    }

    /// Registered ids, in order.
    pub fn list(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.id().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DetectorAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Run every adapter's warm-up hook. Failures are logged, not fatal.
    pub fn warm_up(&self) {
        for adapter in &self.adapters {
            if let Err(e) = adapter.warm_up() {
                log::warn!("detector {}: warm-up failed: {:#}", adapter.id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::adapter::AdapterConfig;
    use crate::detect::backends::StubModel;
    use crate::safety::SafetyTaxonomy;

    fn adapter(id: &str) -> DetectorAdapter {
        DetectorAdapter::new(
            AdapterConfig::new(id, vec![]),
            Arc::new(StubModel::new(id)),
            Arc::new(SafetyTaxonomy::default()),
        )
        .unwrap()
    }

    #[test]
    fn keeps_registration_order_and_rejects_duplicates() {
        let mut registry = DetectorRegistry::new();
        registry.register(adapter("b")).unwrap();
        registry.register(adapter("a")).unwrap();
        assert!(registry.register(adapter("b")).is_err());
        assert_eq!(registry.list(), vec!["b", "a"]);
        assert!(registry.get("a").is_some());
        assert!(registry.get("z").is_none());
    }
}
