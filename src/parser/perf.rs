//! Decoder for `smcli Image_Performance_Query` reports.
//!
//! Every output line is prefixed with the replying node (`zhcp: ...`), and a
//! bare `zhcp: ` line separates the guests, so splitting on that separator
//! yields one block per guest.

use ahash::AHashMap as HashMap;

use super::keyword::{match_lines, Keyword};

/// Raw (unconverted) values of one guest block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerfFields {
    pub userid: Option<String>,
    pub guest_cpus: Option<String>,
    /// e.g. `"1710205201 uS"`
    pub used_cpu_time: Option<String>,
    /// e.g. `"4189268 KB"`
    pub used_memory: Option<String>,
}

const PERF_KEYWORDS: &[Keyword<PerfFields>] = &[
    Keyword::new("Guest name:", |f, v| f.userid = Some(v)),
    Keyword::new("Guest CPUs:", |f, v| f.guest_cpus = Some(v)),
    Keyword::new("Used CPU time:", |f, v| f.used_cpu_time = Some(v)),
    Keyword::new("Used memory:", |f, v| f.used_memory = Some(v)),
];

/// Splits `raw` into guest blocks and returns the raw fields keyed by the
/// upper-cased userid. Blocks without a `Guest name:` line are dropped.
pub fn parse_performance_report(raw: &str, node: &str) -> HashMap<String, PerfFields> {
    let separator = format!("{}: \n", node);
    let mut out = HashMap::new();

    for block in raw.split(separator.as_str()) {
        let matched = match_lines(block.split('\n'), PERF_KEYWORDS);
        let mut fields = matched.fields;
        if let Some(userid) = fields.userid.take() {
            let userid = userid.to_uppercase();
            fields.userid = Some(userid.clone());
            out.insert(userid, fields);
        }
    }

    out
}
