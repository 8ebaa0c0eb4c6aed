//! Serde helper for byte payloads carried base64-encoded inside JSON frames.
//!
//! Used via `#[serde(with = "nido_shared::b64")]`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "super")]
        bytes: Vec<u8>,
    }

    #[test]
    fn round_trip() {
        let w = Wrapper {
            bytes: vec![0, 1, 2, 255],
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("AAEC/w=="));
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
