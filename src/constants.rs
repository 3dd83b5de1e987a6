// -
// Sled namespaces

/// Tree holding the serialized nodes configuration
pub(crate) const NODES_CONFIGURATION_TREE: &str = "_nodes_configuration_tree";

/// Default key of the serialized nodes configuration
pub(crate) const DEFAULT_CONFIG_KEY: &str = "/nodes_configuration";

/// Prefix of environment variables overriding settings
pub(crate) const ENV_PREFIX: &str = "NCM";
