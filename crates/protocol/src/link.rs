//! Connect links (`tc://?v=2&id=...&r=...&ret=back`).
//!
//! The same query is accepted from a deep link, a universal link, or a
//! scanned QR code; only the query string matters.

use url::form_urlencoded;

use crate::error::ProtocolError;
use crate::messages::ConnectRequest;

/// Where the wallet should send the user after answering a connect link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnStrategy {
    /// Return to the previous app.
    Back,
    /// Stay in the wallet.
    None,
    /// Open this URL.
    Url(String),
}

impl ReturnStrategy {
    fn parse(s: &str) -> Self {
        match s {
            "back" => Self::Back,
            "none" => Self::None,
            url => Self::Url(url.to_string()),
        }
    }
}

/// Decoded connect link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectQrQuery {
    /// Protocol version requested by the dApp.
    pub version: u32,
    /// Hex-encoded public key of the dApp session.
    pub client_session_id: String,
    pub request: ConnectRequest,
    pub ret: ReturnStrategy,
}

impl ConnectQrQuery {
    /// Parses a full link or a bare query string.
    pub fn parse(link: &str) -> Result<Self, ProtocolError> {
        let query = match link.split_once('?') {
            Some((_, q)) => q,
            None => link,
        };
        let query = query.split('#').next().unwrap_or_default();

        let mut version = None;
        let mut id = None;
        let mut request = None;
        let mut ret = ReturnStrategy::Back;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "v" => {
                    let v = value
                        .parse::<u32>()
                        .map_err(|_| ProtocolError::InvalidLink(format!("bad version: {value}")))?;
                    version = Some(v);
                }
                "id" => id = Some(value.into_owned()),
                "r" => request = Some(parse_request(&value)?),
                "ret" => ret = ReturnStrategy::parse(&value),
                _ => {}
            }
        }

        let client_session_id =
            id.ok_or_else(|| ProtocolError::InvalidLink("missing id".to_string()))?;
        if client_session_id.len() != 64 || hex::decode(&client_session_id).is_err() {
            return Err(ProtocolError::InvalidLink(
                "id must be a 32-byte hex public key".to_string(),
            ));
        }

        Ok(Self {
            version: version.ok_or_else(|| ProtocolError::InvalidLink("missing v".to_string()))?,
            client_session_id,
            request: request.ok_or_else(|| ProtocolError::InvalidLink("missing r".to_string()))?,
            ret,
        })
    }
}

/// Some dApps percent-encode `r` twice; accept both.
fn parse_request(value: &str) -> Result<ConnectRequest, ProtocolError> {
    match serde_json::from_str(value) {
        Ok(req) => Ok(req),
        Err(first) => {
            let decoded: String = form_urlencoded::parse(format!("r={value}").as_bytes())
                .map(|(_, v)| v.into_owned())
                .next()
                .unwrap_or_default();
            serde_json::from_str(&decoded).map_err(|_| ProtocolError::from(first))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4a1dcc2fbdf8b2b8bcb1f4c3ba2fd8b4de4d1e63d4fe0c8c2fdb3b6a2f56e1a0";
    const R: &str = "%7B%22manifestUrl%22%3A%22https%3A%2F%2Fgood.app%2Fmanifest.json%22%2C%22items%22%3A%5B%7B%22name%22%3A%22ton_addr%22%7D%5D%7D";

    #[test]
    fn parses_deep_link() {
        let link = format!("tc://?v=2&id={ID}&r={R}&ret=none");
        let q = ConnectQrQuery::parse(&link).unwrap();
        assert_eq!(q.version, 2);
        assert_eq!(q.client_session_id, ID);
        assert_eq!(q.request.manifest_url, "https://good.app/manifest.json");
        assert_eq!(q.request.items[0].name, "ton_addr");
        assert_eq!(q.ret, ReturnStrategy::None);
    }

    #[test]
    fn ret_defaults_to_back_and_accepts_urls() {
        let q = ConnectQrQuery::parse(&format!("v=2&id={ID}&r={R}")).unwrap();
        assert_eq!(q.ret, ReturnStrategy::Back);

        let link = format!(
            "https://app.tonkeeper.com/ton-connect?v=2&id={ID}&r={R}&ret=https%3A%2F%2Fgood.app"
        );
        let q = ConnectQrQuery::parse(&link).unwrap();
        assert_eq!(q.ret, ReturnStrategy::Url("https://good.app".into()));
    }

    #[test]
    fn accepts_double_encoded_request() {
        let double = R.replace('%', "%25");
        let q = ConnectQrQuery::parse(&format!("v=2&id={ID}&r={double}")).unwrap();
        assert_eq!(q.request.items.len(), 1);
    }

    #[test]
    fn rejects_missing_or_malformed_fields() {
        assert!(ConnectQrQuery::parse(&format!("v=2&r={R}")).is_err());
        assert!(ConnectQrQuery::parse(&format!("id={ID}&r={R}")).is_err());
        assert!(ConnectQrQuery::parse(&format!("v=two&id={ID}&r={R}")).is_err());
        assert!(ConnectQrQuery::parse("v=2&id=zz&r={}").is_err());
        assert!(ConnectQrQuery::parse(&format!("v=2&id={ID}&r=notjson")).is_err());
    }
}
