//! Server and client configuration.
//!
//! Both are plain [`serde`] structs with defaults for every field, so partial TOML documents work.

use crate::{error::ConfigError, protocol::PROTOCOL_VERSION};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
	/// Log the mismatch and dispatch anyway.
	Warn,
	/// Answer with an `error` reply without dispatching.
	Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	pub protocol_version: String,
	/// Method invoked for targets without `#method`.
	pub default_method: String,
	pub on_version_mismatch: VersionPolicy,
	/// The identifier clients address the reflex channel with.
	pub channel_identifier: String,
	/// Pass one record per emitted operation to the operation logger.
	pub log_operations: bool,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			protocol_version: PROTOCOL_VERSION.to_owned(),
			default_method: "perform".to_owned(),
			on_version_mismatch: VersionPolicy::Warn,
			channel_identifier: "ReflexChannel".to_owned(),
			log_operations: true,
		}
	}
}

impl ServerConfig {
	/// # Errors
	///
	/// Iff `toml` is not a valid configuration document.
	pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(toml)?)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	pub protocol_version: String,
	/// Emit verbose diagnostics (stale URLs, unknown ids, missing elements).
	pub debug: bool,
	/// Ignore tagged operations that originate from other tabs.
	pub isolate: bool,
	pub channel_identifier: String,
	/// The controller identifier the scanner wires elements to.
	pub controller_identifier: String,
	pub reflex_attribute: String,
	pub action_attribute: String,
	pub controller_attribute: String,
	pub root_attribute: String,
	pub permanent_attribute_name: String,
	pub default_selectors: Vec<String>,
	pub resolve_late: bool,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			protocol_version: PROTOCOL_VERSION.to_owned(),
			debug: false,
			isolate: false,
			channel_identifier: "ReflexChannel".to_owned(),
			controller_identifier: "reflex".to_owned(),
			reflex_attribute: "data-reflex".to_owned(),
			action_attribute: "data-action".to_owned(),
			controller_attribute: "data-controller".to_owned(),
			root_attribute: "data-reflex-root".to_owned(),
			permanent_attribute_name: "data-reflex-permanent".to_owned(),
			default_selectors: vec!["body".to_owned()],
			resolve_late: false,
		}
	}
}

impl ClientConfig {
	/// # Errors
	///
	/// Iff `toml` is not a valid configuration document.
	pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(toml)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_documents_keep_defaults() {
		let config = ClientConfig::from_toml_str("debug = true\ndefault_selectors = [\"#app\"]\n").unwrap();
		assert!(config.debug);
		assert_eq!(config.default_selectors, ["#app"]);
		assert_eq!(config.reflex_attribute, "data-reflex");

		let config = ServerConfig::from_toml_str("on_version_mismatch = \"reject\"").unwrap();
		assert_eq!(config.on_version_mismatch, VersionPolicy::Reject);
		assert_eq!(config.default_method, "perform");
	}

	#[test]
	fn unknown_policy_is_an_error() {
		assert!(ServerConfig::from_toml_str("on_version_mismatch = \"explode\"").is_err());
	}
}
