pub mod config;
pub mod simulate;

use std::path::Path;

use vigil_ai::ServerConfig;

/// Load a server configuration file, or the defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<ServerConfig, String> {
    match path {
        Some(path) => ServerConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(ServerConfig::default()),
    }
}
