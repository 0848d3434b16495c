//! Protobuf parser for GTFS Realtime feeds.

use prost::Message;

use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, prost::DecodeError> {
    FeedMessage::decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{Alert, FeedEntity, FeedHeader};

    #[test]
    fn test_parse_invalid_bytes() {
        let invalid_bytes = vec![0xFF, 0xFE, 0x00, 0x01];
        assert!(parse_feed(&invalid_bytes).is_err());
    }

    #[test]
    fn test_parse_feed_with_alert() {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1583020800),
                incrementality: None,
                feed_version: None,
            },
            entity: vec![FeedEntity {
                id: "a1".to_string(),
                alert: Some(Alert {
                    cause: Some(9),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };

        let parsed = parse_feed(&feed.encode_to_vec()).unwrap();

        assert_eq!(parsed.header.gtfs_realtime_version, "2.0");
        assert_eq!(parsed.entity.len(), 1);
        let alert = parsed.entity[0].alert.as_ref().unwrap();
        assert_eq!(alert.cause().as_str_name(), "MAINTENANCE");
        assert_eq!(alert.effect().as_str_name(), "UNKNOWN_EFFECT");
    }
}
