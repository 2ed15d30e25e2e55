//! Broadcaster configuration

/// Broadcaster configuration
#[derive(Clone, Debug)]
pub struct BroadcastConfig {
    /// Name attached to every log event of this broadcaster
    pub label: Option<String>,
    /// Registry entries to preallocate
    pub registry_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            label: None,
            registry_capacity: 0,
        }
    }
}

impl BroadcastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }
}
