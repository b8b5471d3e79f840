//! Decoder for `smcli Virtual_Network_Vswitch_Query_IUO_Stats` reports.
//!
//! The report has a fixed number of lines per record but a variable number of
//! records, so it is decoded positionally:
//!
//! ```text
//! vswitch count: N
//! <blank>
//! N x {
//!     vswitch number: i
//!     vswitch name: NAME
//!     uplink count: U
//!     U x 9 uplink lines
//!     8 bridge lines
//!     nic count: K
//!     K x { nic_id: USERID VDEV, 8 counter lines }
//!     vlan count: V
//!     V x 3 vlan lines
//!     <blank>
//! }
//! ```
//!
//! Every line carries the replying node prefix (`zhcp: `), which is why values
//! are taken from after the keyword instead of from the line start.

use ahash::AHashMap as HashMap;

use crate::error::{Result, ZvmError};
use crate::stats::NicRecord;

const UPLINK_LINES: usize = 9;
const BRIDGE_LINES: usize = 8;
const VLAN_LINES: usize = 3;

/// Counter lines following `nic_id:`, in report order.
const NIC_COUNTERS: &[(&str, fn(&mut NicRecord, u64))] = &[
    ("nic_fr_rx:", |n, v| n.nic_fr_rx = v),
    ("nic_fr_rx_dsc:", |n, v| n.nic_fr_rx_dsc = v),
    ("nic_fr_rx_err:", |n, v| n.nic_fr_rx_err = v),
    ("nic_fr_tx:", |n, v| n.nic_fr_tx = v),
    ("nic_fr_tx_dsc:", |n, v| n.nic_fr_tx_dsc = v),
    ("nic_fr_tx_err:", |n, v| n.nic_fr_tx_err = v),
    ("nic_rx:", |n, v| n.nic_rx = v),
    ("nic_tx:", |n, v| n.nic_tx = v),
];

/// A NIC as it appears inside a vswitch group, before it is keyed by owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNic {
    pub userid: String,
    pub nic: NicRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VswitchGroup {
    pub vswitch_name: String,
    pub nics: Vec<GroupNic>,
}

/// Line cursor over a report.
#[derive(Debug)]
pub struct Cursor<'a> {
    lines: Vec<&'a str>,
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::from_lines(text.split('\n').collect())
    }

    pub fn from_lines(lines: Vec<&'a str>) -> Self {
        Self { lines, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves past `n` lines without looking at them. Running off the end is
    /// only an error once something is read there.
    pub fn skip(&mut self, n: usize) {
        self.position = self.position.saturating_add(n);
    }

    /// Reads the value after the last occurrence of `keyword` on the current
    /// line and advances by one.
    pub fn read_value(&mut self, keyword: &str) -> Result<&'a str> {
        let line: &'a str = self.lines.get(self.position).copied().ok_or_else(|| {
            ZvmError::malformed(format!(
                "report truncated at line {} while expecting {:?}",
                self.position, keyword
            ))
        })?;
        let start = line.rfind(keyword).ok_or_else(|| {
            ZvmError::malformed(format!(
                "line {} is {:?}, expected {:?}",
                self.position, line, keyword
            ))
        })?;
        self.position += 1;
        Ok(line[start + keyword.len()..].trim())
    }

    pub fn read_u64(&mut self, keyword: &str) -> Result<u64> {
        let line = self.position;
        let value = self.read_value(keyword)?;
        value.parse::<u64>().map_err(|e| {
            ZvmError::malformed(format!(
                "{} on line {} is not an integer ({:?}): {}",
                keyword, line, value, e
            ))
        })
    }

    pub fn read_count(&mut self, keyword: &str) -> Result<usize> {
        let line = self.position;
        let value = self.read_u64(keyword)?;
        usize::try_from(value).map_err(|_| {
            ZvmError::malformed(format!("{} on line {} out of range: {}", keyword, line, value))
        })
    }
}

/// Decodes a full report into its vswitch groups, in report order.
pub fn decode_vswitch_report(text: &str) -> Result<Vec<VswitchGroup>> {
    let mut cursor = Cursor::new(text);
    decode_vswitches(&mut cursor)
}

pub fn decode_vswitches(cursor: &mut Cursor<'_>) -> Result<Vec<VswitchGroup>> {
    let count = cursor.read_count("vswitch count:")?;
    cursor.skip(1);

    let mut groups = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        groups.push(decode_vswitch(cursor)?);
    }
    Ok(groups)
}

/// Decodes one vswitch group starting at its `vswitch number:` line.
pub fn decode_vswitch(cursor: &mut Cursor<'_>) -> Result<VswitchGroup> {
    cursor.skip(1);
    let vswitch_name = cursor.read_value("vswitch name:")?.to_string();

    let uplinks = cursor.read_count("uplink count:")?;
    cursor.skip(uplinks.saturating_mul(UPLINK_LINES));
    cursor.skip(BRIDGE_LINES);

    let nic_count = cursor.read_count("nic count:")?;
    let mut nics = Vec::with_capacity(nic_count.min(256));
    for _ in 0..nic_count {
        nics.push(decode_nic(cursor, &vswitch_name)?);
    }

    let vlans = cursor.read_count("vlan count:")?;
    cursor.skip(vlans.saturating_mul(VLAN_LINES));
    cursor.skip(1);

    Ok(VswitchGroup { vswitch_name, nics })
}

/// Decodes `nic_id:` plus its eight counter lines. The counters are trusted
/// to follow in their fixed order.
pub fn decode_nic(cursor: &mut Cursor<'_>, vswitch_name: &str) -> Result<GroupNic> {
    let line = cursor.position();
    let nic_id = cursor.read_value("nic_id:")?;
    let mut parts = nic_id.split_whitespace();
    let (userid, vdev) = match (parts.next(), parts.next(), parts.next()) {
        (Some(userid), Some(vdev), None) => (userid, vdev),
        _ => {
            return Err(ZvmError::malformed(format!(
                "nic_id on line {} is not \"<userid> <vdev>\": {:?}",
                line, nic_id
            )))
        }
    };

    let mut nic = NicRecord {
        vswitch_name: vswitch_name.to_string(),
        nic_vdev: vdev.to_string(),
        ..Default::default()
    };
    for (keyword, set) in NIC_COUNTERS {
        let value = cursor.read_u64(keyword)?;
        set(&mut nic, value);
    }

    Ok(GroupNic {
        userid: userid.to_string(),
        nic,
    })
}

/// Flattens groups into per-owner NIC lists keyed by upper-cased userid,
/// keeping vswitch-major, nic-minor order.
pub fn nics_by_userid(groups: Vec<VswitchGroup>) -> HashMap<String, Vec<NicRecord>> {
    let mut out: HashMap<String, Vec<NicRecord>> = HashMap::new();
    for group in groups {
        for entry in group.nics {
            out.entry(entry.userid.to_uppercase())
                .or_default()
                .push(entry.nic);
        }
    }
    out
}
