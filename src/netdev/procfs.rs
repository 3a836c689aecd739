// /proc/net/dev parser.
//
// Inter-|   Receive                            |  Transmit
//  face |bytes    packets errs drop fifo frame ...|bytes    packets errs ...
//     lo: 4417     52    0    0    0     0 ...     4417      52    0 ...

use super::{DeviceStats, NetDevError, StatsSource};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::LazyLock;

pub const PROC_NET_DEV: &str = "/proc/net/dev";

static FIELD_SEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[ :] *").expect("field separator regex is valid"));

/// Reads `/proc/net/dev` (or a file in the same format) on every call.
pub struct ProcNetDev {
    path: String,
    ignored_devices: Option<Regex>,
}

impl ProcNetDev {
    pub fn new(path: impl Into<String>, ignored_devices: Option<Regex>) -> Self {
        Self {
            path: path.into(),
            ignored_devices,
        }
    }
}

impl StatsSource for ProcNetDev {
    fn collect(&self) -> Result<DeviceStats, NetDevError> {
        let file = File::open(&self.path).map_err(|source| NetDevError::SourceUnavailable {
            origin: self.path.clone(),
            source,
        })?;
        parse_net_dev_stats(
            BufReader::new(file),
            self.ignored_devices.as_ref(),
            &self.path,
        )
    }

    fn origin(&self) -> &str {
        &self.path
    }
}

/// Parse `/proc/net/dev` formatted text into per-device `receive_<field>` /
/// `transmit_<field>` counters, skipping devices matched by `ignore`.
///
/// Field names come from the second header line; the receive list is reused for the
/// transmit half. `origin` only shows up in error messages.
pub fn parse_net_dev_stats<R: BufRead>(
    reader: R,
    ignore: Option<&Regex>,
    origin: &str,
) -> Result<DeviceStats, NetDevError> {
    let read_err = |source| NetDevError::SourceUnavailable {
        origin: origin.to_string(),
        source,
    };
    let mut lines = reader.lines();

    // First line is the "Inter-| Receive | Transmit" banner.
    lines.next().transpose().map_err(read_err)?;
    let header_line = lines.next().transpose().map_err(read_err)?.unwrap_or_default();

    let parts: Vec<&str> = header_line.split('|').collect();
    if parts.len() != 3 {
        // interface + receive + transmit
        return Err(NetDevError::MalformedFormat {
            origin: origin.to_string(),
            kind: "header line",
            line: header_line,
        });
    }
    let header: Vec<&str> = parts[1].split_whitespace().collect();

    let mut net_dev = DeviceStats::new();
    for line in lines {
        let raw = line.map_err(read_err)?;
        let fields: Vec<&str> = FIELD_SEP.split(raw.trim_start_matches(' ')).collect();
        if fields.len() != 2 * header.len() + 1 {
            return Err(NetDevError::MalformedFormat {
                origin: origin.to_string(),
                kind: "line",
                line: raw,
            });
        }

        let dev = fields[0];
        if ignore.is_some_and(|re| re.is_match(dev)) {
            continue;
        }

        let counters = header
            .iter()
            .enumerate()
            .flat_map(|(i, name)| {
                [
                    (format!("receive_{name}"), fields[i + 1].to_string()),
                    (
                        format!("transmit_{name}"),
                        fields[i + 1 + header.len()].to_string(),
                    ),
                ]
            })
            .collect();
        net_dev.insert(dev.to_string(), counters);
    }
    Ok(net_dev)
}
