use crate::config::{Credential, GatewayConfig, ResourceKeys, ResourceMapper};
use crate::error::ProxyError;

#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub resource: &'a str,
    pub credential: &'a Credential,
}

/// Unmapped deployments surface as not-found, the same as unknown paths.
/// A mapped resource without a key is an operator fault.
pub fn resolve<'a>(
    resources: &'a ResourceMapper,
    keys: &'a ResourceKeys,
    deployment: &str,
) -> Result<Resolved<'a>, ProxyError> {
    let resource = resources
        .resource_for(deployment)
        .ok_or(ProxyError::NotFound)?;
    let credential = keys
        .credential_for(resource)
        .ok_or_else(|| ProxyError::MissingCredential {
            resource: resource.to_string(),
        })?;
    Ok(Resolved {
        resource,
        credential,
    })
}

impl GatewayConfig {
    pub fn resolve(&self, deployment: &str) -> Result<Resolved<'_>, ProxyError> {
        resolve(&self.resources, &self.keys, deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_resource_and_credential() {
        let resources = ResourceMapper::from_pairs([("gpt-4", "res1")]);
        let keys = ResourceKeys::from_pairs([("res1", "key-1")]);
        let resolved = resolve(&resources, &keys, "gpt-4").unwrap();
        assert_eq!(resolved.resource, "res1");
        assert_eq!(resolved.credential.expose(), "key-1");
    }

    #[test]
    fn unmapped_deployment_is_not_found() {
        let resources = ResourceMapper::from_pairs([("gpt-4", "res1")]);
        let keys = ResourceKeys::from_pairs([("res1", "key-1")]);
        let err = resolve(&resources, &keys, "dall-e-3").unwrap_err();
        assert!(matches!(err, ProxyError::NotFound));
    }

    #[test]
    fn missing_key_is_a_configuration_fault() {
        let resources = ResourceMapper::from_pairs([("gpt-4", "res1")]);
        let keys = ResourceKeys::default();
        let err = resolve(&resources, &keys, "gpt-4").unwrap_err();
        match err {
            ProxyError::MissingCredential { resource } => assert_eq!(resource, "res1"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
