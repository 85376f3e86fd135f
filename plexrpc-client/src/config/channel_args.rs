//! Channel argument composition.
//!
//! Channel arguments are built once per channel and shared by every call
//! issued over it; building them is a construction-time cost, not a per-call
//! one.

use std::sync::Arc;

use serde::Deserialize;

use crate::config::options::ClientQos;
use crate::error::ConfigError;

/// Merged channel configuration: transport tuning plus an optional service
/// routing policy. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct ChannelArguments {
    default_authority: Option<String>,
    /// Reserved for HTTP-flavored transports.
    follow_redirects: bool,
    service_config: Option<serde_json::Value>,
}

impl ChannelArguments {
    /// Authority override for the channel, if any.
    pub fn default_authority(&self) -> Option<&str> {
        self.default_authority.as_deref()
    }

    /// Whether an HTTP-flavored transport should follow redirects.
    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    /// The attached service routing policy, if one was configured.
    pub fn service_config(&self) -> Option<&serde_json::Value> {
        self.service_config.as_ref()
    }
}

/// Transport tuning knobs, parsed from static configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelTuning {
    #[serde(rename = "default-authority")]
    pub default_authority: Option<String>,
    #[serde(rename = "follow-redirects", default)]
    pub follow_redirects: bool,
}

/// Builder merging base channel tuning with an optional service routing
/// policy document.
///
/// The routing policy is an opaque JSON document (gRPC service-config style);
/// the builder validates that it parses and attaches it verbatim, leaving its
/// interpretation to the transport.
#[derive(Debug)]
pub struct ChannelArgumentsBuilder {
    tuning: ChannelTuning,
    service_config: Option<serde_json::Value>,
}

impl ChannelArgumentsBuilder {
    /// Start from base transport tuning.
    pub fn new(tuning: ChannelTuning) -> Self {
        Self {
            tuning,
            service_config: None,
        }
    }

    /// Attach a service routing policy document. Takes effect for all calls
    /// issued over the channel.
    pub fn service_config(mut self, document: &str) -> Result<Self, ConfigError> {
        let parsed = serde_json::from_str(document).map_err(ConfigError::InvalidServiceConfig)?;
        self.service_config = Some(parsed);
        Ok(self)
    }

    /// Build the default channel configuration.
    pub fn build(&self) -> Arc<ChannelArguments> {
        Arc::new(ChannelArguments {
            default_authority: self.tuning.default_authority.clone(),
            follow_redirects: self.tuning.follow_redirects,
            service_config: self.service_config.clone(),
        })
    }

    /// Build channel configuration for a specific QoS policy.
    ///
    /// Reserved for per-destination override composition; currently degrades
    /// to [`build`](Self::build) and ignores `client_qos`.
    /// TODO: compose per-method retry overrides into the routing policy once
    /// the override semantics are settled.
    pub fn build_with_qos(&self, client_qos: &ClientQos) -> Arc<ChannelArguments> {
        let _ = client_qos;
        self.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_arguments() {
        let args = ChannelArgumentsBuilder::new(ChannelTuning::default()).build();
        assert!(args.default_authority().is_none());
        assert!(!args.follow_redirects());
        assert!(args.service_config().is_none());
    }

    #[test]
    fn test_build_merges_tuning_and_service_config() {
        let tuning = ChannelTuning {
            default_authority: Some("greeter.internal".to_owned()),
            follow_redirects: true,
        };
        let args = ChannelArgumentsBuilder::new(tuning)
            .service_config(r#"{ "loadBalancingConfig": [{ "round_robin": {} }] }"#)
            .unwrap()
            .build();

        assert_eq!(args.default_authority(), Some("greeter.internal"));
        assert!(args.follow_redirects());
        assert!(
            args.service_config()
                .unwrap()
                .get("loadBalancingConfig")
                .is_some()
        );
    }

    #[test]
    fn test_invalid_service_config_is_rejected() {
        let result =
            ChannelArgumentsBuilder::new(ChannelTuning::default()).service_config("{ not json");
        assert!(matches!(result, Err(ConfigError::InvalidServiceConfig(_))));
    }

    #[test]
    fn test_build_with_qos_degrades_to_default() {
        let builder = ChannelArgumentsBuilder::new(ChannelTuning::default());
        let qos = ClientQos::from_json(r#"{ "default": { "attempts": 3 } }"#).unwrap();

        let plain = builder.build();
        let with_qos = builder.build_with_qos(&qos);
        assert!(with_qos.service_config().is_none());
        assert_eq!(plain.follow_redirects(), with_qos.follow_redirects());
    }
}
