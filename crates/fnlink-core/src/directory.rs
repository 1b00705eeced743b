//! Directory data model: appliance discovery records and hosted-application
//! descriptors.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{NasError, NasResult};

/// Address directory record for one appliance, fetched fresh on every
/// discovery call and never cached.
#[derive(Debug, Clone, Deserialize)]
pub struct NasRecord {
    /// Reachable `host:port` endpoints, relay-preferred order.
    #[serde(rename = "fn", default)]
    pub endpoints: Vec<String>,
    /// LAN IPv4 addresses reported by the appliance.
    #[serde(default)]
    pub ipv4: Vec<String>,
}

impl NasRecord {
    /// Host part of the first endpoint, with the port stripped.
    pub fn primary_host(&self) -> Option<&str> {
        self.endpoints
            .first()
            .map(|e| e.split(':').next().unwrap_or(e.as_str()))
    }

    /// First LAN IPv4 address.
    pub fn local_ip(&self) -> Option<&str> {
        self.ipv4.first().map(String::as_str)
    }
}

/// One appliance-hosted application, as reported by the application list.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uri: Option<ServiceUri>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceUri {
    /// Assigned local port; the appliance emits numbers or numeric strings.
    #[serde(default)]
    pub port: Option<Value>,
    /// External routing domain fragment; absent for LAN-only applications.
    #[serde(rename = "fnDomain", default)]
    pub fn_domain: Option<String>,
}

impl ServiceDescriptor {
    /// Title with fallback to the internal name.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    /// Numeric-coerced local port.
    pub fn port(&self) -> Option<u64> {
        match self.uri.as_ref()?.port.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn fn_domain(&self) -> Option<&str> {
        self.uri.as_ref()?.fn_domain.as_deref()
    }

    /// LAN URL, `http://{host}:{port}`.
    pub fn local_url(&self, host: &str) -> Option<String> {
        self.port().map(|p| format!("http://{host}:{p}"))
    }

    /// Externally routable URL, `https://{fnDomain}.{host}`.
    pub fn external_url(&self, host: &str) -> Option<String> {
        self.fn_domain().map(|d| format!("https://{d}.{host}"))
    }
}

/// Parse the application list out of a reply `data` payload. A missing list
/// is an empty directory, not an error.
pub fn from_list_payload(data: Option<&Value>) -> NasResult<Vec<ServiceDescriptor>> {
    let Some(list) = data.and_then(|d| d.get("list")) else {
        return Ok(Vec::new());
    };
    serde_json::from_value(list.clone())
        .map_err(|e| NasError::Codec(format!("bad application list: {e}")))
}

/// Select the application bound to `port`. When several share a port, the
/// first in list order wins.
pub fn find_by_port(list: &[ServiceDescriptor], port: u64) -> Option<&ServiceDescriptor> {
    list.iter().find(|s| s.port() == Some(port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<ServiceDescriptor> {
        from_list_payload(Some(&json!({
            "list": [
                {"title": "alist", "uri": {"port": 5244, "fnDomain": "alist-x1"}},
                {"name": "syncthing", "uri": {"port": "8384"}},
                {"title": "other", "uri": {"port": 5244, "fnDomain": "other-x2"}},
                {"title": "no-uri"},
            ]
        })))
        .unwrap()
    }

    #[test]
    fn nas_record_splits_host_and_port() {
        let record: NasRecord =
            serde_json::from_value(json!({"fn": ["host:0"], "ipv4": ["192.168.1.10"]})).unwrap();
        assert_eq!(record.primary_host(), Some("host"));
        assert_eq!(record.local_ip(), Some("192.168.1.10"));
    }

    #[test]
    fn nas_record_tolerates_missing_fields() {
        let record: NasRecord = serde_json::from_value(json!({})).unwrap();
        assert_eq!(record.primary_host(), None);
        assert_eq!(record.local_ip(), None);
    }

    #[test]
    fn port_match_finds_exact_record() {
        let list = sample();
        let found = find_by_port(&list, 5244).unwrap();
        assert_eq!(found.display_title(), "alist");
    }

    #[test]
    fn port_match_misses_without_crashing() {
        assert!(find_by_port(&sample(), 9999).is_none());
    }

    #[test]
    fn string_ports_coerce_numerically() {
        let list = sample();
        let found = find_by_port(&list, 8384).unwrap();
        assert_eq!(found.display_title(), "syncthing");
    }

    #[test]
    fn duplicate_ports_keep_first_match() {
        // List order is the only tie-break for duplicate ports.
        let list = sample();
        let found = find_by_port(&list, 5244).unwrap();
        assert_eq!(found.display_title(), "alist");
    }

    #[test]
    fn url_builders() {
        let list = sample();
        assert_eq!(
            list[0].external_url("nas.example.com").unwrap(),
            "https://alist-x1.nas.example.com"
        );
        assert_eq!(
            list[0].local_url("192.168.1.10").unwrap(),
            "http://192.168.1.10:5244"
        );
        assert_eq!(list[1].external_url("nas.example.com"), None);
        assert_eq!(list[3].local_url("192.168.1.10"), None);
    }

    #[test]
    fn missing_list_is_empty() {
        assert!(from_list_payload(None).unwrap().is_empty());
        assert!(from_list_payload(Some(&json!({}))).unwrap().is_empty());
    }
}
