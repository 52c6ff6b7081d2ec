//! Shared Key request signing and service SAS generation
//!
//! Both schemes are an HMAC-SHA256 over a newline-joined string, keyed with
//! the base64-decoded account key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use jiff::Timestamp;
use sha2::Sha256;

use cd_core::{AccessPolicy, Error, Result, SasResource};

use crate::API_VERSION;

type HmacSha256 = Hmac<Sha256>;

/// SAS timestamps are whole seconds in UTC
const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Request fields that take part in a Shared Key signature
#[derive(Debug, Default)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub content_length: u64,
    pub content_type: &'a str,
    /// Every `x-ms-*` header sent with the request
    pub ms_headers: &'a [(String, String)],
    /// `/{account}/{path}` with the path exactly as it appears in the URL
    pub resource_path: &'a str,
    /// Query parameters, unencoded
    pub query: &'a [(&'a str, String)],
}

/// An account name plus its decoded key
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKeyCredential {
    pub fn new(account: impl Into<String>, base64_key: &str) -> Result<Self> {
        let key = BASE64
            .decode(base64_key.trim())
            .map_err(|e| Error::Auth(format!("Account key is not valid base64: {e}")))?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn hmac(&self, message: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Auth(format!("Invalid HMAC key: {e}")))?;
        mac.update(message.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// `Authorization` header value for a request
    pub fn authorization(&self, request: &SignableRequest<'_>) -> Result<String> {
        let signature = self.hmac(&string_to_sign(request))?;
        Ok(format!("SharedKey {}:{signature}", self.account))
    }

    /// Service SAS query string, `?`-prefixed
    ///
    /// With `policy_name` the token defers to the stored policy of that name
    /// and only carries the fields the caller set explicitly. Without it the
    /// token must embed an expiry and at least one permission.
    pub fn service_sas(
        &self,
        resource: &SasResource,
        policy: &AccessPolicy,
        policy_name: Option<&str>,
    ) -> Result<String> {
        if policy_name.is_none() && (policy.expiry.is_none() || policy.permissions.is_empty()) {
            return Err(Error::MissingValue(
                "A token without a stored policy needs both 'expiry' and 'p'".into(),
            ));
        }

        let fields = SasFields {
            permissions: policy.permissions.to_string(),
            start: policy.start.map(format_sas_time).unwrap_or_default(),
            expiry: policy.expiry.map(format_sas_time).unwrap_or_default(),
            canonical_resource: match &resource.blob {
                Some(blob) => format!("/blob/{}/{}/{blob}", self.account, resource.container),
                None => format!("/blob/{}/{}", self.account, resource.container),
            },
            identifier: policy_name.unwrap_or_default().to_string(),
            signed_resource: if resource.blob.is_some() { "b" } else { "c" },
        };
        let signature = self.hmac(&fields.string_to_sign())?;
        Ok(fields.query(&signature))
    }
}

fn format_sas_time(ts: Timestamp) -> String {
    ts.strftime(SAS_TIME_FORMAT).to_string()
}

struct SasFields {
    permissions: String,
    start: String,
    expiry: String,
    canonical_resource: String,
    identifier: String,
    signed_resource: &'static str,
}

impl SasFields {
    /// Layout for service SAS versions 2020-12-06 and later
    fn string_to_sign(&self) -> String {
        [
            self.permissions.as_str(),
            &self.start,
            &self.expiry,
            &self.canonical_resource,
            &self.identifier,
            "", // signed IP
            "", // signed protocol
            API_VERSION,
            self.signed_resource,
            "", // snapshot time
            "", // encryption scope
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n")
    }

    fn query(&self, signature: &str) -> String {
        let pairs = [
            ("sv", API_VERSION),
            ("st", self.start.as_str()),
            ("se", self.expiry.as_str()),
            ("sr", self.signed_resource),
            ("sp", self.permissions.as_str()),
            ("si", self.identifier.as_str()),
            ("sig", signature),
        ];
        let query = pairs
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("?{query}")
    }
}

/// Shared Key string-to-sign
///
/// Standard headers are positional; only Content-Length and Content-Type are
/// ever sent by this client. Date travels as `x-ms-date`, so the Date slot
/// stays empty.
pub fn string_to_sign(request: &SignableRequest<'_>) -> String {
    let content_length = match request.content_length {
        0 => String::new(),
        n => n.to_string(),
    };

    let mut headers: Vec<(String, &str)> = request
        .ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .filter(|(k, _)| k.starts_with("x-ms-"))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers: String = headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();

    let mut query: Vec<(String, &str)> = request
        .query
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();
    query.sort_by(|a, b| a.0.cmp(&b.0));
    let mut canonical_resource = request.resource_path.to_string();
    for (k, v) in &query {
        canonical_resource.push_str(&format!("\n{k}:{v}"));
    }

    format!(
        "{}\n\n\n{content_length}\n\n{}\n\n\n\n\n\n\n{canonical_headers}{canonical_resource}",
        request.method.to_ascii_uppercase(),
        request.content_type,
    )
}
