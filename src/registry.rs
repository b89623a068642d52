use std::sync::Arc;

use crate::provider::{Adapter, default_adapters};
use crate::store::ProviderStore;
use crate::types::{ProviderDescriptor, ProviderName};

/// One adapter per known backend, plus read-through access to the store.
///
/// Never fails: a missing adapter is `None`, and a store that cannot be read
/// is treated as empty (logged) so callers fall through to
/// "no providers available".
pub struct ProviderRegistry {
    adapters: Vec<Adapter>,
    store: Arc<dyn ProviderStore>,
}

impl ProviderRegistry {
    /// Registry with the built-in HTTP adapters.
    pub fn new(store: Arc<dyn ProviderStore>) -> Self {
        Self::with_adapters(store, default_adapters())
    }

    /// Registry with a custom adapter set. Later duplicates of a name are dropped.
    pub fn with_adapters(store: Arc<dyn ProviderStore>, adapters: Vec<Adapter>) -> Self {
        let mut unique: Vec<Adapter> = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            if unique.iter().any(|a| a.name() == adapter.name()) {
                tracing::warn!(provider = %adapter.name(), "duplicate adapter ignored");
                continue;
            }
            unique.push(adapter);
        }
        Self {
            adapters: unique,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProviderStore> {
        &self.store
    }

    pub fn get_provider(&self, name: &str) -> Option<&Adapter> {
        let name: ProviderName = name.parse().ok()?;
        self.adapters.iter().find(|a| a.name() == name)
    }

    /// Every adapter, in registration order.
    pub fn get_all_providers(&self) -> &[Adapter] {
        &self.adapters
    }

    /// Adapters that can attempt a call under the latest saved configuration.
    pub async fn get_configured_providers(&self) -> Vec<&Adapter> {
        self.apply_config().await;
        self.adapters.iter().filter(|a| a.is_configured()).collect()
    }

    pub fn provider_names(&self) -> Vec<ProviderName> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Latest descriptors from the store; empty if the store cannot be read.
    pub async fn descriptors(&self) -> Vec<ProviderDescriptor> {
        match self.store.load().await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                tracing::error!("failed to load provider configuration: {e}");
                Vec::new()
            }
        }
    }

    /// Push the latest saved configuration into every matching adapter.
    ///
    /// Unknown names are ignored; adapters without an entry keep their current
    /// settings. Returns the snapshot that was applied.
    pub async fn apply_config(&self) -> Vec<ProviderDescriptor> {
        let descriptors = self.descriptors().await;
        for adapter in &self.adapters {
            if let Some(descriptor) = resolve_descriptor(&descriptors, adapter.name()) {
                configure_from(adapter, descriptor);
            }
        }
        for descriptor in descriptors.iter().filter(|d| d.provider_name().is_none()) {
            tracing::debug!(provider = %descriptor.name, "no adapter for configured provider");
        }
        descriptors
    }
}

/// The entry that governs `name` when the store lists it more than once.
///
/// Same rule as candidate selection: the eligible entry with the lowest
/// priority, earliest in store order on ties. With no eligible entry, the
/// first one listed. Names match case-insensitively.
pub fn resolve_descriptor(
    descriptors: &[ProviderDescriptor],
    name: ProviderName,
) -> Option<&ProviderDescriptor> {
    let first = descriptors
        .iter()
        .find(|d| d.provider_name() == Some(name));
    descriptors
        .iter()
        .filter(|d| d.provider_name() == Some(name) && d.is_eligible())
        .min_by_key(|d| d.priority)
        .or(first)
}

/// Apply one descriptor to its adapter. The local backend always gets an empty credential.
pub fn configure_from(adapter: &Adapter, descriptor: &ProviderDescriptor) {
    let name = adapter.name();
    let api_key = if name.is_local() {
        ""
    } else {
        descriptor.api_key.as_str()
    };
    let base_url = descriptor
        .base_url
        .as_deref()
        .unwrap_or(name.default_base_url());
    adapter.configure(api_key, Some(&descriptor.model), Some(base_url));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProviderStore;

    fn descriptor(name: ProviderName, key: &str, enabled: bool) -> ProviderDescriptor {
        ProviderDescriptor {
            api_key: key.to_string(),
            enabled,
            ..ProviderDescriptor::defaults_for(name)
        }
    }

    #[test]
    fn lookup_by_name_and_unknown_name() {
        let registry = ProviderRegistry::new(Arc::new(MemoryProviderStore::default()));
        assert!(registry.get_provider("anthropic").is_some());
        assert!(registry.get_provider("OpenRouter").is_some());
        assert!(registry.get_provider("gemini").is_none());
        assert_eq!(registry.get_all_providers().len(), 4);
    }

    #[tokio::test]
    async fn configured_providers_track_latest_store_contents() {
        let store = Arc::new(MemoryProviderStore::new(vec![descriptor(
            ProviderName::OpenAi,
            "sk-1",
            true,
        )]));
        let registry = ProviderRegistry::new(store.clone());

        let names: Vec<ProviderName> = registry
            .get_configured_providers()
            .await
            .iter()
            .map(|a| a.name())
            .collect();
        // Ollama needs no key, so it always counts as configured.
        assert_eq!(names, vec![ProviderName::OpenAi, ProviderName::Ollama]);

        store.replace(vec![
            descriptor(ProviderName::OpenAi, "", true),
            descriptor(ProviderName::Anthropic, "sk-ant", true),
        ]);
        let names: Vec<ProviderName> = registry
            .get_configured_providers()
            .await
            .iter()
            .map(|a| a.name())
            .collect();
        assert_eq!(names, vec![ProviderName::Anthropic, ProviderName::Ollama]);
    }

    #[tokio::test]
    async fn unknown_descriptor_names_are_ignored() {
        let mut legacy = descriptor(ProviderName::OpenAi, "k", true);
        legacy.name = "cohere".to_string();
        let store = Arc::new(MemoryProviderStore::new(vec![legacy]));
        let registry = ProviderRegistry::new(store);
        let applied = registry.apply_config().await;
        assert_eq!(applied.len(), 1);
        assert!(
            !registry
                .get_provider("openai")
                .is_some_and(|a| a.is_configured())
        );
    }

    #[test]
    fn resolve_prefers_eligible_entry_with_lowest_priority() {
        let mut stale = descriptor(ProviderName::OpenAi, "", false);
        stale.priority = 5;
        let mut backup = descriptor(ProviderName::OpenAi, "sk-backup", true);
        backup.priority = 3;
        let mut live = descriptor(ProviderName::OpenAi, "sk-live", true);
        live.priority = 1;
        live.name = "OpenAI".to_string();
        let descriptors = vec![stale, backup, live];

        let chosen = resolve_descriptor(&descriptors, ProviderName::OpenAi).unwrap();
        assert_eq!(chosen.api_key, "sk-live");
        assert!(resolve_descriptor(&descriptors, ProviderName::Anthropic).is_none());
    }

    #[test]
    fn resolve_falls_back_to_first_entry_when_none_eligible() {
        let descriptors = vec![
            descriptor(ProviderName::Anthropic, "", true),
            descriptor(ProviderName::Anthropic, "sk-old", false),
        ];
        let chosen = resolve_descriptor(&descriptors, ProviderName::Anthropic).unwrap();
        assert!(chosen.api_key.is_empty());
        assert!(chosen.enabled);
    }

    #[tokio::test]
    async fn duplicate_entries_configure_adapter_from_the_eligible_one() {
        let store = Arc::new(MemoryProviderStore::new(vec![
            descriptor(ProviderName::OpenAi, "sk-live", true),
            descriptor(ProviderName::OpenAi, "", false),
        ]));
        let registry = ProviderRegistry::new(store);
        registry.apply_config().await;
        assert!(
            registry
                .get_provider("openai")
                .is_some_and(|a| a.is_configured())
        );
    }
}
