//! Bridge wire codec
//!
//! Messages use HTTP-style headers followed by a JSON body:
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! <JSON body>
//! ```

use std::io::{self, BufRead, Write};

use crate::common::Error;

/// Largest body accepted; test trees are small, anything bigger is garbage
const MAX_BODY: usize = 16 * 1024 * 1024;

/// Read one message from the stream
///
/// Returns `Error::BridgeClosed` when the peer closed the stream.
pub fn read_message<R: BufRead>(reader: &mut R) -> Result<String, Error> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).map_err(map_eof)?;

        if bytes_read == 0 {
            return Err(Error::BridgeClosed);
        }

        // Empty line ends the headers
        if line == "\r\n" || line == "\n" {
            break;
        }

        let line = line.trim();
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = Some(value.trim().parse().map_err(|_| {
                Error::BridgeProtocol(format!("Invalid Content-Length: {}", value.trim()))
            })?);
        }
    }

    let len = content_length
        .ok_or_else(|| Error::BridgeProtocol("Missing Content-Length header".to_string()))?;

    if len > MAX_BODY {
        return Err(Error::BridgeProtocol(format!(
            "Content-Length too large: {} bytes",
            len
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).map_err(map_eof)?;

    String::from_utf8(body).map_err(|e| Error::BridgeProtocol(format!("Invalid UTF-8: {}", e)))
}

/// Write one message to the stream
pub fn write_message<W: Write>(writer: &mut W, json: &str) -> Result<(), Error> {
    let header = format!("Content-Length: {}\r\n\r\n", json.len());

    writer.write_all(header.as_bytes())?;
    writer.write_all(json.as_bytes())?;
    writer.flush()?;

    Ok(())
}

fn map_eof(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::BridgeClosed
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    #[test]
    fn test_read_message() {
        let data = b"Content-Length: 13\r\n\r\n{\"test\":true}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        let result = read_message(&mut reader).unwrap();
        assert_eq!(result, "{\"test\":true}");
    }

    #[test]
    fn test_read_message_with_extra_headers() {
        let data =
            b"Content-Length: 13\r\nContent-Type: application/json\r\n\r\n{\"test\":true}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));

        let result = read_message(&mut reader).unwrap();
        assert_eq!(result, "{\"test\":true}");
    }

    #[test]
    fn test_write_message() {
        let mut output = Vec::new();
        write_message(&mut output, "{\"test\":true}").unwrap();

        let expected = "Content-Length: 13\r\n\r\n{\"test\":true}";
        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }

    #[test]
    fn test_closed_stream() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(matches!(read_message(&mut reader), Err(Error::BridgeClosed)));

        let truncated = b"Content-Length: 40\r\n\r\n{\"test\"";
        let mut reader = BufReader::new(Cursor::new(truncated.to_vec()));
        assert!(matches!(read_message(&mut reader), Err(Error::BridgeClosed)));
    }

    #[test]
    fn test_missing_length() {
        let data = b"Content-Type: application/json\r\n\r\n{}";
        let mut reader = BufReader::new(Cursor::new(data.to_vec()));
        assert!(matches!(
            read_message(&mut reader),
            Err(Error::BridgeProtocol(_))
        ));
    }
}
