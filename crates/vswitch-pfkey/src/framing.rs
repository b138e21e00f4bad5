//! PF_KEY message framing.
//!
//! PF_KEY messages start with a fixed base header carrying the total
//! message length in 8-byte words. Only that length is interpreted here,
//! to recover message boundaries on a stream socket; everything else is
//! opaque and handed to the multiplexer whole.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the PF_KEY base header (struct sadb_msg).
pub const BASE_HEADER_LEN: usize = 16;

/// PF_KEY lengths are expressed in 8-byte words.
pub const PFKEY_WORD: usize = 8;

/// Byte offset of the base header's length field.
const LEN_OFFSET: usize = 4;

/// Reads one complete PF_KEY message, header included.
///
/// Returns `ErrorKind::UnexpectedEof` when the peer closed the
/// connection at a message boundary.
pub(crate) async fn read_message<R>(conn: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; BASE_HEADER_LEN];
    conn.read_exact(&mut header).await?;

    let words = u16::from_ne_bytes([header[LEN_OFFSET], header[LEN_OFFSET + 1]]) as usize;
    let total = words * PFKEY_WORD;
    if total < BASE_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("PF_KEY message length too short: {words} words"),
        ));
    }

    let mut msg = vec![0u8; total];
    msg[..BASE_HEADER_LEN].copy_from_slice(&header);
    conn.read_exact(&mut msg[BASE_HEADER_LEN..]).await?;
    Ok(msg)
}

/// A syntactically valid PF_KEY message of `words` 8-byte words.
#[cfg(test)]
pub(crate) fn frame(words: u16) -> Vec<u8> {
    let mut msg = vec![0u8; words as usize * PFKEY_WORD];
    msg[0] = 2; // PF_KEY_V2
    msg[LEN_OFFSET..LEN_OFFSET + 2].copy_from_slice(&words.to_ne_bytes());
    msg
}
