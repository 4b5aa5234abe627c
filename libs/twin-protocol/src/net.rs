//! Frame-level socket IO shared by the client and server.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::error::{ProtocolError, Result};

/// Read exactly one Modbus/TCP frame.
///
/// Returns `Ok(None)` on clean EOF at a frame boundary; EOF mid-frame is
/// a connection error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; MBAP_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    if length < 2 || length > MAX_MBAP_LENGTH {
        return Err(ProtocolError::MalformedFrame(format!(
            "declared length {length} outside [2, {MAX_MBAP_LENGTH}]"
        )));
    }

    let mut frame = vec![0u8; MBAP_HEADER_LEN + length];
    frame[..MBAP_HEADER_LEN].copy_from_slice(&header);
    reader
        .read_exact(&mut frame[MBAP_HEADER_LEN..])
        .await
        .map_err(|e| ProtocolError::Connection(format!("peer closed mid-frame: {e}")))?;

    Ok(Some(frame))
}

/// Write one serialized frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_frame_complete() {
        let frame = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut reader = std::io::Cursor::new(frame.to_vec());
        let read = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(read, frame);
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let mut reader = std::io::Cursor::new(Vec::new());
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated() {
        let mut reader = std::io::Cursor::new(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01]);
        let result = read_frame(&mut reader).await;
        assert!(matches!(result, Err(ProtocolError::Connection(_))));
    }

    #[tokio::test]
    async fn test_read_frame_bad_declared_length() {
        let mut reader = std::io::Cursor::new(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
        let result = read_frame(&mut reader).await;
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }
}
