//! Peer console messages
//!
//! Datagrams carry a four-character tag followed by the body. Only console
//! lines (`"CON "`) are understood; anything else is ignored.

const CONSOLE_TAG: &str = "CON ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteMessage {
    Console(String),
}

impl RemoteMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RemoteMessage::Console(text) => format!("{}{}", CONSOLE_TAG, text).into_bytes(),
        }
    }

    /// Decode a datagram; unknown tags and invalid UTF-8 yield `None`
    pub fn decode(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        let tag = text.get(..CONSOLE_TAG.len())?;
        match tag {
            CONSOLE_TAG => Some(RemoteMessage::Console(text[CONSOLE_TAG.len()..].to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_message() {
        let encoded = RemoteMessage::Console("12:00 Starting X11".to_string()).encode();
        assert_eq!(encoded, b"CON 12:00 Starting X11");
        assert_eq!(
            RemoteMessage::decode(&encoded),
            Some(RemoteMessage::Console("12:00 Starting X11".to_string()))
        );
    }

    #[test]
    fn test_unknown_or_short_is_ignored() {
        assert_eq!(RemoteMessage::decode(b"STA running"), None);
        assert_eq!(RemoteMessage::decode(b"CO"), None);
        assert_eq!(RemoteMessage::decode(&[0xff, 0xfe, 0x20, 0x20, 0x20]), None);
        assert_eq!(
            RemoteMessage::decode(b"CON "),
            Some(RemoteMessage::Console(String::new()))
        );
    }
}
