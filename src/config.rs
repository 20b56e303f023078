use axum::http::HeaderValue;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

pub const MODEL_MAPPER_VAR: &str = "MODEL_MAPPER";
pub const RESOURCE_MAPPER_VAR: &str = "RESOURCE_MAPPER";
pub const KEYS_MAPPER_VAR: &str = "KEYS_MAPPER";
pub const AUTHORIZATION_VAR: &str = "AUTHORIZATION";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} is not valid JSON: {source}")]
    InvalidJson {
        var: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{var} has an invalid shape: {detail}")]
    InvalidShape { var: &'static str, detail: String },
    #[error("resource {resource} used by deployment {deployment} has no entry in KEYS_MAPPER")]
    MissingResourceKey { deployment: String, resource: String },
    #[error("credential for resource {resource} is not a valid header value")]
    InvalidCredential { resource: String },
}

/// Backend secret for one resource. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Model identifier -> deployment name, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ModelMapper {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl ModelMapper {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut mapper = Self::default();
        for (model, deployment) in pairs {
            let model = model.into();
            let deployment = deployment.into();
            match mapper.index.get(&model) {
                Some(&pos) => mapper.entries[pos].1 = deployment,
                None => {
                    mapper.index.insert(model.clone(), mapper.entries.len());
                    mapper.entries.push((model, deployment));
                }
            }
        }
        mapper
    }

    pub fn deployment_for(&self, model: &str) -> Option<&str> {
        self.index
            .get(model)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    /// Deployment names in configuration order, one per model entry.
    pub fn deployments(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, deployment)| deployment.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Deployment name -> resource name.
#[derive(Debug, Clone, Default)]
pub struct ResourceMapper(HashMap<String, String>);

impl ResourceMapper {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn resource_for(&self, deployment: &str) -> Option<&str> {
        self.0.get(deployment).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Resource name -> credential.
#[derive(Debug, Clone, Default)]
pub struct ResourceKeys(HashMap<String, Credential>);

impl ResourceKeys {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Credential::new(v)))
                .collect(),
        )
    }

    pub fn credential_for(&self, resource: &str) -> Option<&Credential> {
        self.0.get(resource)
    }
}

/// The three lookup tables, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub models: ModelMapper,
    pub resources: ResourceMapper,
    pub keys: ResourceKeys,
}

impl GatewayConfig {
    /// Builds the configuration and checks that every mapped resource has a
    /// usable credential.
    pub fn new(
        models: ModelMapper,
        resources: ResourceMapper,
        keys: ResourceKeys,
    ) -> Result<Self, ConfigError> {
        for (deployment, resource) in resources.iter() {
            let credential =
                keys.credential_for(resource)
                    .ok_or_else(|| ConfigError::MissingResourceKey {
                        deployment: deployment.to_string(),
                        resource: resource.to_string(),
                    })?;
            if HeaderValue::from_str(credential.expose()).is_err() {
                return Err(ConfigError::InvalidCredential {
                    resource: resource.to_string(),
                });
            }
        }
        Ok(Self {
            models,
            resources,
            keys,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let models = read_string_map(&lookup, MODEL_MAPPER_VAR)?;
        let resources = read_string_map(&lookup, RESOURCE_MAPPER_VAR)?;
        let keys = read_string_map(&lookup, KEYS_MAPPER_VAR)?;
        Self::new(
            ModelMapper::from_pairs(models),
            ResourceMapper::from_pairs(resources),
            ResourceKeys::from_pairs(keys),
        )
    }
}

fn read_json<F>(lookup: &F, var: &'static str) -> Result<Value, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(var))?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::InvalidJson { var, source })
}

/// Reads a `{"key": "value"}` object, keeping the object's key order.
pub fn read_string_map<F>(lookup: &F, var: &'static str) -> Result<Vec<(String, String)>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Value::Object(map) = read_json(lookup, var)? else {
        return Err(ConfigError::InvalidShape {
            var,
            detail: "expected a JSON object".to_string(),
        });
    };
    object_to_pairs(var, map)
}

fn object_to_pairs(
    var: &'static str,
    map: Map<String, Value>,
) -> Result<Vec<(String, String)>, ConfigError> {
    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            _ => Err(ConfigError::InvalidShape {
                var,
                detail: format!("value for {key:?} must be a string"),
            }),
        })
        .collect()
}

/// Reads a `["a", "b"]` array of strings.
pub fn read_string_list<F>(lookup: &F, var: &'static str) -> Result<Vec<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Value::Array(items) = read_json(lookup, var)? else {
        return Err(ConfigError::InvalidShape {
            var,
            detail: "expected a JSON array".to_string(),
        });
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            _ => Err(ConfigError::InvalidShape {
                var,
                detail: "array items must be strings".to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let owned: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| owned.get(var).cloned()
    }

    #[test]
    fn loads_all_three_tables() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, r#"{"gpt-4":"gpt-4","gpt-35-turbo":"gpt-35"}"#),
            (RESOURCE_MAPPER_VAR, r#"{"gpt-4":"res1","gpt-35":"res2"}"#),
            (KEYS_MAPPER_VAR, r#"{"res1":"k1","res2":"k2"}"#),
        ]);
        let config = GatewayConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.models.deployment_for("gpt-35-turbo"), Some("gpt-35"));
        assert_eq!(config.resources.resource_for("gpt-4"), Some("res1"));
        assert_eq!(
            config.keys.credential_for("res2").map(Credential::expose),
            Some("k2")
        );
    }

    #[test]
    fn model_mapper_keeps_configuration_order() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, r#"{"zeta":"z","alpha":"a","mid":"m"}"#),
            (RESOURCE_MAPPER_VAR, "{}"),
            (KEYS_MAPPER_VAR, "{}"),
        ]);
        let config = GatewayConfig::from_lookup(lookup).unwrap();
        let deployments: Vec<&str> = config.models.deployments().collect();
        assert_eq!(deployments, vec!["z", "a", "m"]);
    }

    #[test]
    fn missing_table_is_reported_by_name() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, "{}"),
            (RESOURCE_MAPPER_VAR, "{}"),
        ]);
        let err = GatewayConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(KEYS_MAPPER_VAR)));
    }

    #[test]
    fn blank_table_counts_as_missing() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, "  "),
            (RESOURCE_MAPPER_VAR, "{}"),
            (KEYS_MAPPER_VAR, "{}"),
        ]);
        let err = GatewayConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(MODEL_MAPPER_VAR)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, "{not json"),
            (RESOURCE_MAPPER_VAR, "{}"),
            (KEYS_MAPPER_VAR, "{}"),
        ]);
        let err = GatewayConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidJson {
                var: MODEL_MAPPER_VAR,
                ..
            }
        ));
    }

    #[test]
    fn non_string_values_are_rejected() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, "{}"),
            (RESOURCE_MAPPER_VAR, r#"{"gpt-4": 1}"#),
            (KEYS_MAPPER_VAR, "{}"),
        ]);
        let err = GatewayConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidShape {
                var: RESOURCE_MAPPER_VAR,
                ..
            }
        ));
    }

    #[test]
    fn resource_without_key_fails_startup() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, "{}"),
            (RESOURCE_MAPPER_VAR, r#"{"gpt-4":"res1"}"#),
            (KEYS_MAPPER_VAR, r#"{"other":"k"}"#),
        ]);
        let err = GatewayConfig::from_lookup(lookup).unwrap_err();
        match err {
            ConfigError::MissingResourceKey {
                deployment,
                resource,
            } => {
                assert_eq!(deployment, "gpt-4");
                assert_eq!(resource, "res1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn credential_with_newline_fails_startup() {
        let lookup = lookup_from(&[
            (MODEL_MAPPER_VAR, "{}"),
            (RESOURCE_MAPPER_VAR, r#"{"gpt-4":"res1"}"#),
            (KEYS_MAPPER_VAR, r#"{"res1":"bad\nkey"}"#),
        ]);
        let err = GatewayConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCredential { .. }));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
    }

    #[test]
    fn string_list_rejects_objects() {
        let lookup = lookup_from(&[(AUTHORIZATION_VAR, r#"{"a":"b"}"#)]);
        let err = read_string_list(&lookup, AUTHORIZATION_VAR).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidShape { .. }));
    }
}
