//! Options record exchanged once per connection.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::CodecType;
use crate::error::{RpcError, Result};

/// Magic number identifying this protocol.
pub const MAGIC_NUMBER: u64 = 0x3bef5c;

/// Negotiation record.
///
/// Always JSON, one line, so it can be read before a codec is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Must equal [`MAGIC_NUMBER`].
    pub magic_number: u64,
    /// Wire-format identifier, e.g. `"application/msgpack"`.
    pub codec_type: String,
}

impl Options {
    /// Options selecting the given wire format.
    pub fn new(codec_type: CodecType) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: codec_type.as_str().to_string(),
        }
    }

    /// Encode as a `\n`-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self).map_err(|e| RpcError::Encode(e.to_string()))?;
        line.push(b'\n');
        Ok(line)
    }

    /// Write the options line to a freshly opened connection.
    pub async fn send<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_line()?).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new(CodecType::MsgPack)
    }
}
