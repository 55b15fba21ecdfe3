use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ConfigurationError;
use crate::types::CertificatePair;

/// Encode staking material for embedding in a descriptor. Empty input gives an empty string.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}

pub fn encode_pair(key: &[u8], cert: &[u8]) -> CertificatePair {
    CertificatePair {
        key: encode(key),
        cert: encode(cert),
    }
}

/// Returns the raw (key, cert) bytes of a pair.
pub fn decode_pair(pair: &CertificatePair) -> Result<(Vec<u8>, Vec<u8>), ConfigurationError> {
    let key = decode(&pair.key).map_err(|source| ConfigurationError::Encoding {
        field: "staking key",
        source,
    })?;
    let cert = decode(&pair.cert).map_err(|source| ConfigurationError::Encoding {
        field: "staking certificate",
        source,
    })?;
    Ok((key, cert))
}
