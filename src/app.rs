//! Core application runner for `ble-sensor-decoder`.
//!
//! Kept apart from CLI parsing and process exit codes so the run loop can be
//! tested with an injected record source and injected output streams.

use crate::alias::{Alias, AliasMap};
use crate::decoder::{DecodedPayload, DecoderChain, Format};
use crate::field::FieldValue;
use crate::filter::MacFilter;
use crate::mac_address::MacAddress;
use crate::output::OutputFormatter;
use crate::output::influxdb::InfluxDbFormatter;
use crate::source::{RecordResult, read_records};
use clap::Parser;
use std::io;
use std::io::Write;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "ble_sensor")]
    pub influxdb_measurement: String,

    /// Specify human-readable alias for a device address.
    /// Format: --alias DE:AD:BE:EF:00:00=Sauna
    #[arg(long = "alias", value_parser = crate::alias::parse_alias, value_name = "ALIAS")]
    pub aliases: Vec<Alias>,

    /// Only report these devices. May be given multiple times.
    #[arg(short = 'm', long = "mac", value_name = "MAC")]
    pub macs: Vec<MacAddress>,

    /// Advertisement formats to decode, in order. Defaults to all.
    #[arg(short = 'f', long = "format", value_enum, value_name = "FORMAT")]
    pub formats: Vec<Format>,

    /// Verbose output, print parse errors for unrecognized data
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Source of advertisement records, replaceable in tests.
pub trait RecordSource: Send + Sync {
    fn open(&self) -> mpsc::Receiver<RecordResult>;
}

/// Records read line by line from standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinSource;

impl RecordSource for StdinSource {
    fn open(&self) -> mpsc::Receiver<RecordResult> {
        read_records(BufReader::new(tokio::io::stdin()))
    }
}

fn advertised_name(payload: &DecodedPayload) -> Option<&str> {
    match payload.get("name") {
        Some(FieldValue::Text(name)) => Some(name.as_str()),
        _ => None,
    }
}

fn write_payload(
    formatter: &dyn OutputFormatter,
    payload: &DecodedPayload,
    aliases: &AliasMap,
    out: &mut dyn Write,
) -> io::Result<()> {
    let Some(mac) = payload.mac_address() else {
        warn!("decoded payload without device address");
        return Ok(());
    };
    let name = crate::alias::resolve_name(&mac, advertised_name(payload), aliases);
    let line = formatter.format(payload, &name);
    writeln!(out, "{line}")
}

/// Run the core processing loop, writing formatted output to `out` and verbose errors to `err`.
///
/// - Records from devices outside the `--mac` allow-list are skipped.
/// - Every payload a decoder emits is formatted and written as one line to `out`.
/// - Unparseable records and decode errors are written to `err` only when
///   `options.verbose` is true; the loop carries on with the next record.
pub async fn run_with_io(
    options: Options,
    source: &dyn RecordSource,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let aliases: AliasMap = crate::alias::to_map(&options.aliases);
    let filter = MacFilter::new(&options.macs);
    let formatter = InfluxDbFormatter::new(options.influxdb_measurement);
    let mut decoders = DecoderChain::from_formats(&options.formats);
    info!(decoders = ?decoders.names(), "decoding advertisements");

    let mut records = source.open();

    while let Some(result) = records.recv().await {
        let advertisement = match result {
            Ok(advertisement) => advertisement,
            Err(parse_err) => {
                debug!(error = %parse_err, "skipping record");
                if options.verbose {
                    writeln!(err, "{parse_err}")?;
                }
                continue;
            }
        };

        if !filter.allows(&advertisement.peer()) {
            continue;
        }

        match decoders.decode(&advertisement) {
            Ok(Some(payload)) => write_payload(&formatter, &payload, &aliases, out)?,
            Ok(None) => {}
            Err(decode_err) => {
                warn!(peer = %advertisement.peer(), error = %decode_err, "decode failed");
                if options.verbose {
                    writeln!(err, "{decode_err}")?;
                }
            }
        }
    }

    Ok(())
}
