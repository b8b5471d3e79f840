//! xCAT management node client.
//!
//! All zhcp commands go through xCAT's `xdsh` REST resource; node and table
//! lookups use the `nodes` and `tables` resources. Every call funnels into
//! [`XcatTransport::request`].

pub mod response;
pub mod testdata;
pub mod transport;
pub mod url;

use ahash::AHashMap as HashMap;
use reqwest::Method;
use tracing::debug;

use crate::error::Result;
use crate::parser::perf::{parse_performance_report, PerfFields};
use crate::parser::table::{parse_lsdef_userid, parse_zvm_table, select_instances};
use crate::parser::vswitch::{decode_vswitch_report, VswitchGroup};

pub use response::XcatResponse;
pub use transport::{HttpTransport, XcatTransport};
pub use url::XcatUrl;

/// Identity of the zhcp node that executes smcli commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZhcpInfo {
    pub nodename: String,
    pub hostname: String,
    pub userid: String,
}

pub struct XcatClient {
    transport: Box<dyn XcatTransport>,
    url: XcatUrl,
}

impl XcatClient {
    pub fn new(transport: Box<dyn XcatTransport>, url: XcatUrl) -> Self {
        Self { transport, url }
    }

    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&[String]>,
    ) -> Result<XcatResponse> {
        debug!(
            "Sending request to xCAT. Request-method:{} URL:{} Body:{:?}",
            method,
            self.url.redact(url),
            body
        );
        let message = self.transport.request(method, url, body)?;
        debug!("xCAT response: {}", message);
        XcatResponse::load(&message)
    }

    /// z/VM userid of an xCAT node.
    pub fn get_userid(&self, node: &str) -> Result<String> {
        let resp = self.request(Method::GET, &self.url.lsdef_node(node, None), None)?;
        let info = resp.info_strings(0)?;
        parse_lsdef_userid(info.iter().map(String::as_str), node)
    }

    pub fn get_node_hostname(&self, node: &str) -> Result<String> {
        let addp = format!("&col=node&value={}&attribute=hostnames", node);
        let url = self.url.gettab("hosts", Some(&addp));
        self.request(Method::GET, &url, None)?.first_data_string()
    }

    pub fn resolve_zhcp(&self, nodename: &str) -> Result<ZhcpInfo> {
        Ok(ZhcpInfo {
            nodename: nodename.to_string(),
            hostname: self.get_node_hostname(nodename)?,
            userid: self.get_userid(nodename)?,
        })
    }

    /// Guests managed through `zhcp`, keyed by node name. The z/VM host,
    /// the zhcp node and the xCAT master are not guests.
    pub fn list_instances(
        &self,
        zhcp: &ZhcpInfo,
        zvm_host: &str,
        xcat_master: &str,
    ) -> Result<HashMap<String, String>> {
        let resp = self.request(Method::GET, &self.url.tabdump("zvm", None), None)?;
        let rows = parse_zvm_table(&resp.data_strings(0)?)?;
        Ok(select_instances(
            rows,
            &zhcp.hostname,
            &[zvm_host, &zhcp.nodename, xcat_master],
        ))
    }

    /// Runs a shell command on `node`.
    pub fn xdsh(&self, node: &str, command: &str) -> Result<XcatResponse> {
        debug!("Run command {} on xCAT node {}", command, node);
        let body = [format!("command={}", command)];
        self.request(Method::PUT, &self.url.xdsh(node), Some(&body))
    }

    /// Raw performance fields per upper-cased userid.
    pub fn image_performance_query(
        &self,
        zhcp_node: &str,
        userids: &[String],
    ) -> Result<HashMap<String, PerfFields>> {
        if userids.is_empty() {
            return Ok(HashMap::new());
        }
        let cmd = format!(
            "smcli Image_Performance_Query -T \"{}\" -c {}",
            userids.join(" "),
            userids.len()
        );
        let raw = self.xdsh(zhcp_node, &cmd)?.first_data_string()?;
        Ok(parse_performance_report(&raw, zhcp_node))
    }

    /// Vswitch groups with their NICs, as seen by `zhcp_node`.
    pub fn vswitch_query_iuo_stats(&self, zhcp_node: &str) -> Result<Vec<VswitchGroup>> {
        let cmd = format!(
            "smcli Virtual_Network_Vswitch_Query_IUO_Stats -T \"{}\" -k \"switch_name=*\"",
            zhcp_node
        );
        // Items may hold several lines each; rejoin before splitting.
        let raw = self.xdsh(zhcp_node, &cmd)?.data_strings(0)?.join("\n");
        decode_vswitch_report(&raw)
    }
}
