//! Layered configuration loading: built-in defaults, an optional TOML file,
//! then environment variable overrides, using `figment` to merge the layers
//! against a schema that matches exactly what this fabric loads.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

use super::error::ConfigResult;
use super::schema::NetConfig;

/// Loads configuration from (lowest to highest precedence):
/// 1. [`NetConfig::default`]
/// 2. `path`, if it exists, parsed as TOML
/// 3. Environment variables prefixed `DQM4HEP_`, with `__` as the nesting
///    separator (e.g. `DQM4HEP_NETWORK_MANAGER__PORT=6000`)
/// 4. The two ad hoc variables the original DQM4hep tooling reads directly:
///    `DQM4hep_NETMGR_HOST` / `DQM4hep_NETMGR_PORT`, applied last so they win
///    over everything else.
pub fn load_config(path: Option<&std::path::Path>) -> ConfigResult<NetConfig> {
    let mut figment = Figment::from(Serialized::defaults(NetConfig::default()));

    if let Some(path) = path
        && path.exists()
    {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("DQM4HEP_").split("__"));

    let mut config: NetConfig = figment.extract()?;
    apply_legacy_env_overrides(&mut config);
    Ok(config)
}

/// The original DQM4hep network manager reads its bind host/port from two
/// specifically-cased environment variables rather than a generic prefixed
/// scheme; honored here so operators following the original deployment docs
/// don't need a `DQM4HEP_NETWORK_MANAGER__*` translation.
fn apply_legacy_env_overrides(config: &mut NetConfig) {
    if let Ok(host) = std::env::var("DQM4hep_NETMGR_HOST") {
        config.network_manager.host = host;
    }
    if let Ok(port) = std::env::var("DQM4hep_NETMGR_PORT")
        && let Ok(port) = port.parse()
    {
        config.network_manager.port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.network_manager.port, 5555);
        assert_eq!(config.hub.port, 5556);
    }

    #[test]
    fn missing_file_path_is_not_an_error() {
        let config = load_config(Some(std::path::Path::new("/nonexistent/dqm4hep.toml")));
        assert!(config.is_ok());
    }
}
