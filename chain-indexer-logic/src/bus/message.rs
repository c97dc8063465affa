//! Bus wire format (spec §6): ASCII `"<mode>:<hex_hash>"`.

use crate::errors::MessageDecodeError;
use crate::settings::DataCollectionMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub mode: DataCollectionMode,
    pub tx_hash: String,
}

impl BusMessage {
    pub fn encode(mode: DataCollectionMode, tx_hash: &str) -> String {
        format!("{mode}:{tx_hash}")
    }

    pub fn decode(raw: &str) -> Result<Self, MessageDecodeError> {
        let (mode_str, hash) = raw
            .split_once(':')
            .ok_or_else(|| MessageDecodeError::MissingSeparator(raw.to_string()))?;

        let mode: DataCollectionMode = mode_str
            .parse()
            .map_err(|_| MessageDecodeError::UnknownMode(mode_str.to_string()))?;

        let is_valid_hash = hash.len() == 66
            && hash.starts_with("0x")
            && hash[2..].chars().all(|c| c.is_ascii_hexdigit());
        if !is_valid_hash {
            return Err(MessageDecodeError::MalformedHash(hash.to_string()));
        }

        Ok(BusMessage {
            mode,
            tx_hash: hash.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_well_formed_message() {
        let hash = format!("0x{}", "ab".repeat(32));
        let encoded = BusMessage::encode(DataCollectionMode::Full, &hash);
        let decoded = BusMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.mode, DataCollectionMode::Full);
        assert_eq!(decoded.tx_hash, hash);
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(BusMessage::decode("full0xdead").is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(BusMessage::decode(&format!("bogus:{hash}")).is_err());
    }

    #[test]
    fn rejects_short_hash() {
        assert!(BusMessage::decode("full:0xdead").is_err());
    }
}
