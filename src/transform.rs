use crate::config::ModelMapper;
use crate::endpoint::{DeploymentSource, MEDIA_API_VERSION, Operation};
use crate::error::ProxyError;
use bytes::Bytes;
use serde_json::Value;

/// `max_tokens` forced onto chat requests that carry a `media` field.
pub const MEDIA_MAX_TOKENS: u64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub deployment: String,
    pub api_version: &'static str,
}

/// Resolves deployment and API version for a JSON operation and returns the
/// body to send. The body is only re-serialized when the media rewrite fires.
pub fn transform(
    op: Operation,
    models: &ModelMapper,
    body: Bytes,
) -> Result<(Plan, Bytes), ProxyError> {
    let parsed: Value = serde_json::from_slice(&body)
        .map_err(|err| ProxyError::BadRequest(format!("invalid JSON body: {err}")))?;

    let (source, api_version) = operation_defaults(op)?;
    match source {
        DeploymentSource::Fixed(deployment) => Ok((
            Plan {
                deployment: deployment.to_string(),
                api_version,
            },
            body,
        )),
        DeploymentSource::FromModel => {
            let Value::Object(mut obj) = parsed else {
                return Err(ProxyError::BadRequest(
                    "body must be a JSON object".to_string(),
                ));
            };
            let model = obj
                .get("model")
                .and_then(Value::as_str)
                .ok_or_else(|| ProxyError::BadRequest("model is required".to_string()))?;
            let deployment = models
                .deployment_for(model)
                .ok_or(ProxyError::NotFound)?
                .to_string();

            if op.mutates_payload() && obj.contains_key("media") {
                obj.insert("max_tokens".to_string(), Value::from(MEDIA_MAX_TOKENS));
                let rewritten = serde_json::to_vec(&Value::Object(obj))
                    .map_err(|err| ProxyError::BadRequest(err.to_string()))?;
                return Ok((
                    Plan {
                        deployment,
                        api_version: MEDIA_API_VERSION,
                    },
                    Bytes::from(rewritten),
                ));
            }

            Ok((
                Plan {
                    deployment,
                    api_version,
                },
                body,
            ))
        }
    }
}

/// Plan for operations whose body is forwarded unread.
pub fn plan_passthrough(op: Operation) -> Result<Plan, ProxyError> {
    match operation_defaults(op)? {
        (DeploymentSource::Fixed(deployment), api_version) => Ok(Plan {
            deployment: deployment.to_string(),
            api_version,
        }),
        (DeploymentSource::FromModel, _) => Err(ProxyError::BadRequest(
            "operation requires a JSON body".to_string(),
        )),
    }
}

fn operation_defaults(op: Operation) -> Result<(DeploymentSource, &'static str), ProxyError> {
    op.deployment_source()
        .zip(op.api_version())
        .ok_or(ProxyError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::DEFAULT_API_VERSION;
    use serde_json::json;

    fn mapper() -> ModelMapper {
        ModelMapper::from_pairs([("gpt-4", "gpt-4"), ("gpt-4o-mini", "mini-deploy")])
    }

    fn bytes(value: Value) -> Bytes {
        Bytes::from(value.to_string())
    }

    #[test]
    fn chat_resolves_deployment_from_model() {
        let body = bytes(json!({"model": "gpt-4o-mini", "messages": []}));
        let (plan, out) = transform(Operation::ChatCompletions, &mapper(), body.clone()).unwrap();
        assert_eq!(plan.deployment, "mini-deploy");
        assert_eq!(plan.api_version, DEFAULT_API_VERSION);
        assert_eq!(out, body);
    }

    #[test]
    fn chat_with_media_forces_max_tokens_and_alternate_version() {
        let body = bytes(json!({"model": "gpt-4", "messages": [], "media": "x", "max_tokens": 10}));
        let (plan, out) = transform(Operation::ChatCompletions, &mapper(), body).unwrap();
        assert_eq!(plan.api_version, MEDIA_API_VERSION);
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["max_tokens"], 4096);
        assert_eq!(value["media"], "x");
        assert_eq!(value["model"], "gpt-4");
    }

    #[test]
    fn media_rewrite_keeps_large_integers_exact() {
        let body = Bytes::from_static(
            br#"{"model":"gpt-4","media":"x","seed":123456789012345678901234,"temperature":0.1}"#,
        );
        let (_, out) = transform(Operation::ChatCompletions, &mapper(), body).unwrap();
        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.contains(r#""seed":123456789012345678901234"#), "{text}");
        assert!(text.contains(r#""temperature":0.1"#), "{text}");
    }

    #[test]
    fn media_presence_is_enough_even_when_null() {
        let body = bytes(json!({"model": "gpt-4", "media": null}));
        let (plan, out) = transform(Operation::ChatCompletions, &mapper(), body).unwrap();
        assert_eq!(plan.api_version, MEDIA_API_VERSION);
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["max_tokens"], 4096);
    }

    #[test]
    fn unknown_model_is_not_found() {
        let body = bytes(json!({"model": "claude", "messages": []}));
        let err = transform(Operation::ChatCompletions, &mapper(), body).unwrap_err();
        assert!(matches!(err, ProxyError::NotFound));
    }

    #[test]
    fn chat_without_model_is_bad_request() {
        let body = bytes(json!({"messages": []}));
        let err = transform(Operation::ChatCompletions, &mapper(), body).unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(_)));
    }

    #[test]
    fn chat_array_body_is_bad_request() {
        let err = transform(
            Operation::ChatCompletions,
            &mapper(),
            Bytes::from_static(b"[1,2]"),
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(_)));
    }

    #[test]
    fn invalid_json_is_bad_request() {
        for op in [
            Operation::ChatCompletions,
            Operation::ImagesGenerations,
            Operation::Completions,
            Operation::AudioSpeech,
        ] {
            let err = transform(op, &mapper(), Bytes::from_static(b"{nope")).unwrap_err();
            assert!(matches!(err, ProxyError::BadRequest(_)), "{op:?}");
        }
    }

    #[test]
    fn fixed_operations_pass_body_through_unchanged() {
        let raw = Bytes::from_static(b"{ \"prompt\" :  \"a cat\", \"media\": 1 }");
        let cases = [
            (Operation::ImagesGenerations, "dall-e-3"),
            (Operation::Completions, "gpt-4o"),
            (Operation::AudioSpeech, "tts"),
        ];
        for (op, deployment) in cases {
            let (plan, out) = transform(op, &mapper(), raw.clone()).unwrap();
            assert_eq!(plan.deployment, deployment);
            assert_eq!(plan.api_version, DEFAULT_API_VERSION);
            assert_eq!(out, raw, "{op:?} must not rewrite the body");
        }
    }

    #[test]
    fn passthrough_plan_for_transcriptions() {
        let plan = plan_passthrough(Operation::AudioTranscriptions).unwrap();
        assert_eq!(plan.deployment, "whisper");
        assert_eq!(plan.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn passthrough_plan_rejects_model_routed_operations() {
        assert!(plan_passthrough(Operation::ChatCompletions).is_err());
    }
}
