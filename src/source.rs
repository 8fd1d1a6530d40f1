//! Advertisement records read from text.
//!
//! One record per line: `<MAC> <RSSI|-> <HEX AD DATA>`, where the hex string
//! is the raw advertising data of the report. Blank lines and lines starting
//! with `#` are skipped. This lets captured traffic be replayed through the
//! decoders without a Bluetooth adapter.

use crate::advertisement::{AdParseError, Advertisement};
use crate::mac_address::{MacAddress, ParseMacError};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Channel buffer size for parsed records.
pub const RECORD_CHANNEL_BUFFER_SIZE: usize = 100;

/// Errors returned for lines that are not valid records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseRecordError {
    #[error("line {line}: missing {field}")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: {source}")]
    Mac {
        line: usize,
        #[source]
        source: ParseMacError,
    },
    #[error("line {line}: invalid RSSI '{value}'")]
    Rssi { line: usize, value: String },
    #[error("line {line}: invalid hex data: {source}")]
    Hex {
        line: usize,
        #[source]
        source: hex::FromHexError,
    },
    #[error("line {line}: {source}")]
    AdData {
        line: usize,
        #[source]
        source: AdParseError,
    },
    #[error("read error: {0}")]
    Io(String),
}

/// Convenience alias for parsed records or parse errors.
pub type RecordResult = Result<Advertisement, ParseRecordError>;

/// Parse one line. Returns `Ok(None)` for blank lines and comments.
pub fn parse_record(
    line_no: usize,
    line: &str,
) -> Result<Option<Advertisement>, ParseRecordError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let mut next = |field: &'static str| {
        parts
            .next()
            .ok_or(ParseRecordError::MissingField { line: line_no, field })
    };

    let peer = next("address")?
        .parse::<MacAddress>()
        .map_err(|source| ParseRecordError::Mac { line: line_no, source })?;

    let rssi = match next("rssi")? {
        "-" => None,
        value => Some(value.parse::<i8>().map_err(|_| ParseRecordError::Rssi {
            line: line_no,
            value: value.to_string(),
        })?),
    };

    let data = hex::decode(next("data")?)
        .map_err(|source| ParseRecordError::Hex { line: line_no, source })?;

    Advertisement::from_ad_bytes(peer, rssi, &data)
        .map(Some)
        .map_err(|source| ParseRecordError::AdData { line: line_no, source })
}

/// Read records from `reader` on a background task.
///
/// The channel closes when the reader reaches end of input or fails.
pub fn read_records<R>(reader: R) -> mpsc::Receiver<RecordResult>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RECORD_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut lines = reader.lines();
        let mut line_number = 0;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(ParseRecordError::Io(e.to_string()))).await;
                    break;
                }
            };
            line_number += 1;

            let result = match parse_record(line_number, &line) {
                Ok(Some(advertisement)) => Ok(advertisement),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            if tx.send(result).await.is_err() {
                break;
            }
        }
        debug!(lines = line_number, "record input finished");
    });

    rx
}
