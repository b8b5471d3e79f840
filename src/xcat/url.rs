//! URL builder for the xCAT REST API (`/xcatws`).

use reqwest::Url;

/// Only used to borrow `Url`'s form encoding for query strings.
const QUERY_BASE: &str = "https://xcat/";
const PREFIX: &str = "/xcatws";
const NODES: &str = "/nodes";
const TABLES: &str = "/tables";
const XDSH: &str = "/dsh";

/// Builds request paths with the credentials query suffix attached.
#[derive(Debug, Clone)]
pub struct XcatUrl {
    suffix: String,
    password_param: String,
}

impl XcatUrl {
    pub fn new(username: &str, password: &str) -> Self {
        let credentials = encode_query(&[
            ("userName", username),
            ("password", password),
            ("format", "json"),
        ]);
        Self {
            suffix: format!("?{}", credentials),
            password_param: format!("&{}", encode_query(&[("password", password)])),
        }
    }

    /// `PUT` target that runs a shell command on `node`.
    pub fn xdsh(&self, node: &str) -> String {
        format!("{}{}/{}{}{}", PREFIX, NODES, node, XDSH, self.suffix)
    }

    pub fn gettab(&self, table: &str, addp: Option<&str>) -> String {
        let url = format!("{}{}/{}{}", PREFIX, TABLES, table, self.suffix);
        append_addp(url, addp)
    }

    pub fn tabdump(&self, table: &str, addp: Option<&str>) -> String {
        self.gettab(table, addp)
    }

    pub fn lsdef_node(&self, node: &str, addp: Option<&str>) -> String {
        let url = format!("{}{}/{}{}", PREFIX, NODES, node, self.suffix);
        append_addp(url, addp)
    }

    /// Removes the password parameter so the URL can be logged.
    pub fn redact(&self, url: &str) -> String {
        url.replace(&self.password_param, "")
    }
}

fn encode_query(pairs: &[(&str, &str)]) -> String {
    Url::parse_with_params(QUERY_BASE, pairs)
        .ok()
        .and_then(|url| url.query().map(str::to_string))
        .unwrap_or_default()
}

fn append_addp(url: String, addp: Option<&str>) -> String {
    match addp {
        Some(extra) => url + extra,
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> XcatUrl {
        XcatUrl::new("user", "pwd")
    }

    #[test]
    fn test_xdsh() {
        assert_eq!(
            url().xdsh("fakenode"),
            "/xcatws/nodes/fakenode/dsh?userName=user&password=pwd&format=json"
        );
    }

    #[test]
    fn test_gettab_and_tabdump() {
        let expected = "/xcatws/tables/table?userName=user&password=pwd&format=json&addp";
        assert_eq!(url().gettab("table", Some("&addp")), expected);
        assert_eq!(url().tabdump("table", Some("&addp")), expected);
    }

    #[test]
    fn test_lsdef_node() {
        assert_eq!(
            url().lsdef_node("fakenode", None),
            "/xcatws/nodes/fakenode?userName=user&password=pwd&format=json"
        );
    }

    #[test]
    fn test_redact_hides_password() {
        let u = url();
        let redacted = u.redact(&u.xdsh("n"));
        assert!(!redacted.contains("pwd"));
        assert!(redacted.ends_with("?userName=user&format=json"));
    }

    #[test]
    fn test_credentials_are_encoded() {
        let u = XcatUrl::new("ad min", "p&ss#+1");
        let target = u.lsdef_node("n", None);
        assert_eq!(
            target,
            "/xcatws/nodes/n?userName=ad+min&password=p%26ss%23%2B1&format=json"
        );
        assert_eq!(u.redact(&target), "/xcatws/nodes/n?userName=ad+min&format=json");
    }
}
