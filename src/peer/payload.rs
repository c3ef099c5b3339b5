use crate::error::{Error, Result};
use crate::peer::types::SdpPayload;
use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

// Ограничиваем размер распаковываемых данных для защиты от zip-bomb
const MAX_DECOMPRESSED_SIZE: u64 = 256 * 1024; // 256 KiB

/// SDP на проводе: JSON -> gzip -> base64
pub fn encode_sdp(payload: &SdpPayload) -> Result<String> {
    let json = serde_json::to_vec(payload).map_err(|e| Error::Payload(e.to_string()))?;

    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    gz.write_all(&json)
        .map_err(|e| Error::Payload(e.to_string()))?;
    let compressed = gz.finish().map_err(|e| Error::Payload(e.to_string()))?;

    Ok(general_purpose::STANDARD.encode(compressed))
}

pub fn decode_sdp(encoded: &str) -> Result<SdpPayload> {
    let compressed = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Payload(e.to_string()))?;

    let gz = GzDecoder::new(&compressed[..]);
    let mut json = Vec::new();
    let mut limited_reader = gz.take(MAX_DECOMPRESSED_SIZE);
    limited_reader
        .read_to_end(&mut json)
        .map_err(|e| Error::Payload(e.to_string()))?;

    serde_json::from_slice(&json).map_err(|e| Error::Payload(e.to_string()))
}
