/// The default configuration file name for the simulator.
/// Resolved relative to [`DEFAULT_CONFIG_DIR`] under the invoking user's
/// home directory.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "slavesim.toml";

/// Directory under `$HOME` holding the simulator configuration.
pub const DEFAULT_CONFIG_DIR: &str = ".config/slavesim";
