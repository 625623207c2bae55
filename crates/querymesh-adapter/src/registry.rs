//! The adapter registry: eager construction by engine tag, secrets resolved
//! before construction (spec §4.1), grounded in the original
//! implementation's `DatasourceRegistry` eager-construction pattern.

use crate::adapter::Adapter;
use crate::config::{DatasourceConfig, ResolvedDatasourceConfig};
use crate::error::AdapterError;
use querymesh_secrets::SecretResolver;
use std::collections::HashMap;
use std::sync::Arc;

/// A constructor for one engine tag, turning a [`ResolvedDatasourceConfig`]
/// into a connected [`Adapter`].
pub type AdapterConstructor =
    Arc<dyn Fn(ResolvedDatasourceConfig) -> Result<Arc<dyn Adapter>, AdapterError> + Send + Sync>;

/// Holds one eagerly-constructed [`Adapter`] per configured datasource.
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    /// Builds the registry: for every `config`, resolves connection secrets
    /// via `resolver`, looks up a constructor by `engine_type` in
    /// `constructors`, and constructs the adapter. Any unknown engine tag or
    /// secret-resolution failure fails the whole build (spec §4.1: "Unknown
    /// engine tags fail startup; secret-resolution failures fail startup").
    pub async fn build(
        configs: Vec<DatasourceConfig>,
        constructors: &HashMap<String, AdapterConstructor>,
        resolver: &SecretResolver,
    ) -> Result<Self, AdapterError> {
        let mut adapters = HashMap::with_capacity(configs.len());

        for config in configs {
            if adapters.contains_key(&config.id) {
                return Err(AdapterError::DuplicateDatasourceId(config.id));
            }

            let constructor = constructors
                .get(&config.engine_type)
                .ok_or_else(|| AdapterError::UnknownEngineTag(config.engine_type.clone()))?;

            let connection = resolver
                .resolve_map(&config.connection)
                .await
                .map_err(|e| AdapterError::SecretResolutionFailed {
                    datasource_id: config.id.clone(),
                    message: e.to_string(),
                })?;

            let resolved = ResolvedDatasourceConfig {
                id: config.id.clone(),
                engine_type: config.engine_type,
                connection,
                options: config.options,
            };

            let adapter = constructor(resolved)?;
            adapter
                .connect()
                .await
                .map_err(|message| AdapterError::ConnectionFailed { datasource_id: config.id.clone(), message })?;

            adapters.insert(config.id, adapter);
        }

        Ok(Self { adapters })
    }

    /// Looks up the adapter for `datasource_id`, if registered.
    pub fn get(&self, datasource_id: &str) -> Option<&Arc<dyn Adapter>> {
        self.adapters.get(datasource_id)
    }

    /// All registered datasource ids.
    pub fn datasource_ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use async_trait::async_trait;
    use querymesh_core::{AdapterRequest, ResultFrame};
    use querymesh_schema::{SchemaContract, SchemaMetadata, SchemaSnapshot};
    use std::collections::HashSet;

    struct StubAdapter {
        id: String,
    }

    #[async_trait]
    impl Adapter for StubAdapter {
        fn datasource_id(&self) -> &str {
            &self.id
        }
        fn capabilities(&self) -> HashSet<Capability> {
            HashSet::from([Capability::SupportsSql])
        }
        async fn connect(&self) -> Result<(), String> {
            Ok(())
        }
        async fn fetch_schema_snapshot(&self) -> Result<SchemaSnapshot, String> {
            Ok(SchemaSnapshot {
                datasource_id: self.id.clone(),
                contract: SchemaContract::default(),
                metadata: SchemaMetadata::default(),
            })
        }
        async fn execute(&self, _request: AdapterRequest) -> ResultFrame {
            ResultFrame::success(vec![], vec![])
        }
        fn get_dialect(&self) -> &str {
            "stub"
        }
        async fn test_connection(&self) -> bool {
            true
        }
        fn get_details(&self) -> HashMap<String, String> {
            HashMap::new()
        }
    }

    fn constructors() -> HashMap<String, AdapterConstructor> {
        let mut map: HashMap<String, AdapterConstructor> = HashMap::new();
        map.insert(
            "stub".to_string(),
            Arc::new(|cfg: ResolvedDatasourceConfig| {
                Ok(Arc::new(StubAdapter { id: cfg.id }) as Arc<dyn Adapter>)
            }),
        );
        map
    }

    #[tokio::test]
    async fn unknown_engine_tag_fails_the_whole_build() {
        let configs = vec![DatasourceConfig {
            id: "ds1".to_string(),
            engine_type: "nonexistent".to_string(),
            connection: HashMap::new(),
            options: Default::default(),
        }];
        let resolver = SecretResolver::with_env_bootstrap();
        let result = AdapterRegistry::build(configs, &constructors(), &resolver).await;
        assert!(matches!(result, Err(AdapterError::UnknownEngineTag(_))));
    }

    #[tokio::test]
    async fn eagerly_constructs_one_adapter_per_datasource() {
        let configs = vec![
            DatasourceConfig { id: "ds1".to_string(), engine_type: "stub".to_string(), connection: HashMap::new(), options: Default::default() },
            DatasourceConfig { id: "ds2".to_string(), engine_type: "stub".to_string(), connection: HashMap::new(), options: Default::default() },
        ];
        let resolver = SecretResolver::with_env_bootstrap();
        let registry = AdapterRegistry::build(configs, &constructors(), &resolver).await.unwrap();
        assert!(registry.get("ds1").is_some());
        assert!(registry.get("ds2").is_some());
        assert_eq!(registry.datasource_ids().count(), 2);
    }
}
