//! Content-Length framing for DAP messages
//!
//! Each message is a header block terminated by an empty line, followed by
//! exactly `Content-Length` bytes of UTF-8 JSON. Headers other than
//! Content-Length are ignored.

use crate::{Error, ProtocolMessage, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

const CONTENT_LENGTH: &str = "content-length";

/// Serialize and frame a message
pub fn encode_message(message: &ProtocolMessage) -> Result<Vec<u8>> {
    let json = serde_json::to_string(message)?;
    let mut framed = format!("Content-Length: {}\r\n\r\n", json.len()).into_bytes();
    framed.extend_from_slice(json.as_bytes());
    Ok(framed)
}

/// Write one framed message and flush
pub async fn write_message<W>(writer: &mut W, message: &ProtocolMessage) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let framed = encode_message(message)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. `Ok(None)` means clean EOF between messages.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<ProtocolMessage>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut saw_header = false;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            if saw_header {
                return Err(Error::Protocol("EOF inside message header".to_string()));
            }
            return Ok(None);
        }

        let header = line.trim();
        if header.is_empty() {
            if saw_header {
                break;
            }
            // Stray blank line between messages
            continue;
        }
        saw_header = true;

        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let value = value.trim();
                content_length = Some(value.parse().map_err(|_| {
                    Error::Protocol(format!("Invalid Content-Length: {}", value))
                })?);
            }
        }
    }

    let length = content_length
        .ok_or_else(|| Error::Protocol("Missing Content-Length header".to_string()))?;

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer).await?;
    let content = String::from_utf8(buffer)?;

    trace!("Received message: {}", content);

    let message: ProtocolMessage = serde_json::from_str(&content)?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, Request};
    use tokio::io::BufReader;

    #[test]
    fn test_encode_prefixes_byte_length() {
        let framed = encode_message(&ProtocolMessage::Request(Request::new(1, "threads"))).unwrap();
        let text = String::from_utf8(framed).unwrap();
        let (header, body) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
        assert!(body.contains(r#""command":"threads""#));
    }

    #[tokio::test]
    async fn test_read_two_messages_back_to_back() {
        let mut bytes = encode_message(&ProtocolMessage::Request(Request::new(1, "threads"))).unwrap();
        bytes.extend(
            encode_message(&ProtocolMessage::Event(Event::new(2, "initialized"))).unwrap(),
        );

        let mut reader = BufReader::new(bytes.as_slice());
        let first = read_message(&mut reader).await.unwrap().unwrap();
        let second = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(first.name(), "threads");
        assert_eq!(second.name(), "initialized");
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_multibyte_body_uses_byte_length() {
        let json = r#"{"seq":3,"type":"event","event":"output","body":{"output":"héllo ✓"}}"#;
        let framed = format!(
            "Content-Type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            json.len(),
            json
        );
        let mut reader = BufReader::new(framed.as_bytes());
        let message = read_message(&mut reader).await.unwrap().unwrap();
        match message {
            ProtocolMessage::Event(e) => assert_eq!(e.body.unwrap()["output"], "héllo ✓"),
            other => panic!("Expected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_content_length_is_protocol_error() {
        let mut reader = BufReader::new("X-Other: 1\r\n\r\n{}".as_bytes());
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_truncated_header_is_protocol_error() {
        let mut reader = BufReader::new("Content-Length: 10\r\n".as_bytes());
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
