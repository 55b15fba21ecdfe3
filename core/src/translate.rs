//! Translation of node config files into backend-native settings.
//!
//! Keys follow the node's flag schema (`network-peer-list-gossip-frequency`).
//! The environment dialect maps them to `AVAGO_NETWORK_PEER_LIST_GOSSIP_FREQUENCY`,
//! the flag dialect (used for process-level flags) to `--http-port=<value>`. There is no
//! key registry: unknown keys go through the same rule.

use serde_json::Value;
use std::fmt::Display;

use crate::error::TranslationError;
use crate::types::EnvVar;

pub const ENV_PREFIX: &str = "AVAGO_";
pub const NETWORK_ID_ENV: &str = "AVAGO_NETWORK_ID";

/// `network-peer-list-gossip-frequency` -> `AVAGO_NETWORK_PEER_LIST_GOSSIP_FREQUENCY`
pub fn translate_key(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_uppercase().replace('-', "_"))
}

/// `http-port`, 9650 -> `--http-port=9650`
pub fn flag(key: &str, value: impl Display) -> String {
    format!("--{}={}", key, value)
}

/// Parse a config file into its (key, value) entries in document order.
fn parse_config_file(config_file: &str) -> Result<Vec<(String, String)>, TranslationError> {
    let doc: Value = serde_json::from_str(config_file)?;
    let Value::Object(map) = doc else {
        return Err(TranslationError::NotAnObject);
    };

    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(TranslationError::NonScalar { key }),
            };
            Ok((key, value))
        })
        .collect()
}

/// Build a node's environment: `AVAGO_NETWORK_ID` first, then one variable per config key.
pub fn translate(config_file: &str, network_id: u32) -> Result<Vec<EnvVar>, TranslationError> {
    let entries = parse_config_file(config_file)?;

    let mut env = Vec::with_capacity(entries.len() + 1);
    env.push(EnvVar::new(NETWORK_ID_ENV, network_id.to_string()));

    for (key, value) in entries {
        let name = translate_key(&key);
        if name == NETWORK_ID_ENV {
            return Err(TranslationError::Reserved {
                key,
                reserved: NETWORK_ID_ENV,
            });
        }
        env.push(EnvVar::new(name, value));
    }

    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key() {
        assert_eq!(
            translate_key("network-peer-list-gossip-frequency"),
            "AVAGO_NETWORK_PEER_LIST_GOSSIP_FREQUENCY"
        );
        assert_eq!(translate_key("log-level"), "AVAGO_LOG_LEVEL");
        assert_eq!(translate_key("snow-sample-size"), "AVAGO_SNOW_SAMPLE_SIZE");
        // Unknown keys use the same rule
        assert_eq!(translate_key("made-up.key"), "AVAGO_MADE_UP.KEY");
    }

    #[test]
    fn test_translate_preserves_order_and_values() {
        let config = r#"
        {
            "network-peer-list-gossip-frequency": "250ms",
            "network-max-reconnect-delay": "1s",
            "health-check-frequency": "2s"
        }"#;

        let env = translate(config, 9999).unwrap();
        assert_eq!(
            env,
            vec![
                EnvVar::new("AVAGO_NETWORK_ID", "9999"),
                EnvVar::new("AVAGO_NETWORK_PEER_LIST_GOSSIP_FREQUENCY", "250ms"),
                EnvVar::new("AVAGO_NETWORK_MAX_RECONNECT_DELAY", "1s"),
                EnvVar::new("AVAGO_HEALTH_CHECK_FREQUENCY", "2s"),
            ]
        );

        // Pure: same input, same output
        assert_eq!(translate(config, 9999).unwrap(), env);
    }

    #[test]
    fn test_translate_empty_document() {
        let env = translate("{}", 12345).unwrap();
        assert_eq!(env, vec![EnvVar::new("AVAGO_NETWORK_ID", "12345")]);
    }

    #[test]
    fn test_translate_scalar_values() {
        let env = translate(r#"{"staking-enabled": false, "snow-sample-size": 2}"#, 1).unwrap();
        assert_eq!(env[1], EnvVar::new("AVAGO_STAKING_ENABLED", "false"));
        assert_eq!(env[2], EnvVar::new("AVAGO_SNOW_SAMPLE_SIZE", "2"));
    }

    #[test]
    fn test_translate_rejects_network_id_collision() {
        let err = translate(r#"{"network-id": "5"}"#, 9999).unwrap_err();
        assert!(matches!(err, TranslationError::Reserved { .. }));

        let err = translate(r#"{"network_id": "5"}"#, 9999).unwrap_err();
        assert!(matches!(err, TranslationError::Reserved { .. }));
    }

    #[test]
    fn test_translate_malformed() {
        assert!(matches!(
            translate("{not json", 1),
            Err(TranslationError::Parse(_))
        ));
        assert!(matches!(
            translate(r#"["a", "b"]"#, 1),
            Err(TranslationError::NotAnObject)
        ));
        assert!(matches!(
            translate(r#"{"bootstrap-ips": ["a"]}"#, 1),
            Err(TranslationError::NonScalar { .. })
        ));
        assert!(matches!(
            translate(r#"{"log-level": null}"#, 1),
            Err(TranslationError::NonScalar { .. })
        ));
    }

    #[test]
    fn test_flag() {
        assert_eq!(flag("http-port", 9650), "--http-port=9650");
        assert_eq!(flag("bootstrap-ids", ""), "--bootstrap-ids=");
    }
}
