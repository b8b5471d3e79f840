//! Parsers for xCAT table dumps and node attribute listings.

use ahash::AHashMap as HashMap;

use super::keyword::{match_required, Keyword};
use crate::error::{Result, ZvmError};

/// One row of the `zvm` table: `"node","hcp","userid",...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZvmTableRow {
    pub node: String,
    pub hcp: String,
    pub userid: String,
}

/// Parses `tabdump zvm` output. The first entry is the column header and is
/// skipped; every other row needs at least three fields.
pub fn parse_zvm_table<S: AsRef<str>>(entries: &[S]) -> Result<Vec<ZvmTableRow>> {
    let mut rows = Vec::with_capacity(entries.len().saturating_sub(1));
    for entry in entries.iter().skip(1) {
        let entry = entry.as_ref();
        let fields: Vec<&str> = entry.split(',').collect();
        if fields.len() < 3 {
            return Err(ZvmError::malformed(format!(
                "zvm table row has {} fields, expected at least 3: {:?}",
                fields.len(),
                entry
            )));
        }
        rows.push(ZvmTableRow {
            node: fields[0].trim_matches('"').to_string(),
            hcp: fields[1].trim_matches('"').to_string(),
            userid: fields[2].trim_matches('"').to_string(),
        });
    }
    Ok(rows)
}

/// Keeps rows managed through `zhcp_hostname`, dropping the excluded nodes
/// (polling host, zhcp node, xCAT master). Returns node name to upper-cased
/// userid.
pub fn select_instances(
    rows: Vec<ZvmTableRow>,
    zhcp_hostname: &str,
    excluded_nodes: &[&str],
) -> HashMap<String, String> {
    rows.into_iter()
        .filter(|row| row.hcp.eq_ignore_ascii_case(zhcp_hostname))
        .filter(|row| {
            !excluded_nodes
                .iter()
                .any(|ex| row.node.eq_ignore_ascii_case(ex))
        })
        .map(|row| (row.node, row.userid.to_uppercase()))
        .collect()
}

#[derive(Default)]
struct NodeAttrs {
    userid: Option<String>,
}

const LSDEF_KEYWORDS: &[Keyword<NodeAttrs>] = &[Keyword::new("userid=", |a, v| a.userid = Some(v))];

/// Extracts the `userid=` attribute from `lsdef` info lines.
pub fn parse_lsdef_userid<'a, I>(lines: I, node: &str) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let attrs = match_required(lines, LSDEF_KEYWORDS, &format!("userid of node {}", node))?;
    attrs
        .userid
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ZvmError::malformed(format!("empty userid for node {}", node)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<&'static str> {
        vec![
            "#node,hcp,userid,nodetype,parent,comments,disable",
            "\"xcat\",\"zhcp.com\",\"xcat\"",
            "\"zhcp\",\"zhcp.com\",\"zhcp\"",
            "\"zvmhost1\",\"zhcp.com\",\"\"",
            "\"node1\",\"zhcp.com\",\"node1\"",
            "\"node2\",\"zhcp.com\",\"node2\"",
            "\"node3\",\"zhcp2.com\",\"node3\"",
        ]
    }

    #[test]
    fn test_select_instances_filters_infrastructure() {
        let rows = parse_zvm_table(&table()).unwrap();
        assert_eq!(rows.len(), 6);

        let instances = select_instances(rows, "ZHCP.com", &["zvmhost1", "zhcp", "XCAT"]);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances["node1"], "NODE1");
        assert_eq!(instances["node2"], "NODE2");
        assert!(!instances.contains_key("node3"));
    }

    #[test]
    fn test_short_row_is_malformed() {
        let mut entries = table();
        entries.push("\"node4\",\"zhcp.com\"");
        let err = parse_zvm_table(&entries).unwrap_err();
        assert!(matches!(err, ZvmError::MalformedResponse(_)));
    }

    #[test]
    fn test_lsdef_userid() {
        let lines = [
            "Object name: fakenode",
            "    hcp=zhcp.com",
            "    userid=FAKEUSER",
        ];
        assert_eq!(parse_lsdef_userid(lines, "fakenode").unwrap(), "FAKEUSER");
    }

    #[test]
    fn test_lsdef_without_userid_is_malformed() {
        let err = parse_lsdef_userid(["Object name: x"], "x").unwrap_err();
        assert!(matches!(err, ZvmError::MalformedResponse(_)));
    }
}
