use serde::Deserialize;

use crate::error::ConfigurationError;

#[derive(Deserialize)]
struct GenesisHeader {
    #[serde(rename = "networkID")]
    network_id: u32,
}

/// Read the numeric network identifier out of a genesis document.
pub fn network_id(genesis: &str) -> Result<u32, ConfigurationError> {
    let header: GenesisHeader = serde_json::from_str(genesis)
        .map_err(|e| ConfigurationError::Genesis(format!("missing or invalid networkID: {}", e)))?;
    Ok(header.network_id)
}
