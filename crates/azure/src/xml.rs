//! Minimal XML handling for Blob service payloads
//!
//! The service's responses are flat and predictable, so elements are located
//! by tag search rather than with a full parser. Text content is unescaped.

use std::collections::BTreeMap;
use std::time::SystemTime;

use jiff::Timestamp;

use cd_core::{AccessPolicy, BlobEntry, BlobKind, ContainerInfo, ListSegment, PageRange, Permissions};

/// Inner text of every `<tag>` element in `xml`, in document order
///
/// Matches `<tag>` and `<tag attr="...">` but not `<tagSuffix>`. A
/// self-closing `<tag/>` yields an empty string.
pub fn elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after_name = &rest[start + open.len()..];
        let Some(gt) = after_name.find('>') else {
            break;
        };
        let head = &after_name[..gt];
        if !(head.is_empty() || head.starts_with(char::is_whitespace) || head.starts_with('/')) {
            rest = after_name;
            continue;
        }
        let body_start = &after_name[gt + 1..];
        if head.ends_with('/') {
            found.push("");
            rest = body_start;
            continue;
        }
        let Some(end) = body_start.find(&close) else {
            break;
        };
        found.push(&body_start[..end]);
        rest = &body_start[end + close.len()..];
    }

    found
}

/// Unescaped text of the first `<tag>` element
pub fn text(xml: &str, tag: &str) -> Option<String> {
    elements(xml, tag).first().map(|t| unescape(t))
}

pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Parse an RFC 1123 date as used in `Last-Modified`
pub fn http_date(value: &str) -> Option<Timestamp> {
    let time: SystemTime = httpdate::parse_http_date(value.trim()).ok()?;
    Timestamp::try_from(time).ok()
}

fn next_marker(xml: &str) -> Option<String> {
    text(xml, "NextMarker").filter(|m| !m.is_empty())
}

/// `List Containers` response
pub fn parse_containers(xml: &str) -> (Vec<ContainerInfo>, Option<String>) {
    let containers = elements(xml, "Container")
        .into_iter()
        .filter_map(|c| {
            let mut info = ContainerInfo::new(text(c, "Name")?);
            info.last_modified = text(c, "Last-Modified").as_deref().and_then(http_date);
            info.etag = text(c, "Etag");
            Some(info)
        })
        .collect();
    (containers, next_marker(xml))
}

/// `List Blobs` response
pub fn parse_blobs(xml: &str) -> ListSegment {
    let items = elements(xml, "Blob")
        .into_iter()
        .filter_map(|b| {
            let name = text(b, "Name")?;
            let props = elements(b, "Properties").first().copied().unwrap_or_default();
            let kind = text(props, "BlobType")
                .as_deref()
                .and_then(BlobKind::from_wire)
                .unwrap_or_default();
            let size = text(props, "Content-Length")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);

            let mut entry = BlobEntry::new(name, kind, size);
            entry.last_modified = text(props, "Last-Modified").as_deref().and_then(http_date);
            entry.etag = text(props, "Etag");
            entry.content_type = text(props, "Content-Type").filter(|c| !c.is_empty());
            entry.snapshot = text(b, "Snapshot").filter(|s| !s.is_empty());
            entry.deleted = text(b, "Deleted").is_some_and(|d| d == "true");
            if let Some(meta) = elements(b, "Metadata").first() {
                entry.metadata = children(meta);
            }
            Some(entry)
        })
        .collect();

    ListSegment {
        items,
        next_marker: next_marker(xml),
    }
}

/// Direct `<key>value</key>` children of a metadata block
fn children(xml: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut rest = xml;
    while let Some(lt) = rest.find('<') {
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else {
            break;
        };
        let key = &after[..gt];
        let body = &after[gt + 1..];
        let close = format!("</{key}>");
        let Some(end) = body.find(&close) else {
            break;
        };
        map.insert(key.to_string(), unescape(&body[..end]));
        rest = &body[end + close.len()..];
    }
    map
}

/// `Get Page Ranges` response; clear ranges are ignored
pub fn parse_page_list(xml: &str) -> Vec<PageRange> {
    elements(xml, "PageRange")
        .into_iter()
        .filter_map(|r| {
            let start = text(r, "Start")?.parse().ok()?;
            let end = text(r, "End")?.parse().ok()?;
            Some(PageRange::new(start, end))
        })
        .collect()
}

/// `Get Container ACL` body
pub fn parse_signed_identifiers(xml: &str) -> BTreeMap<String, AccessPolicy> {
    elements(xml, "SignedIdentifier")
        .into_iter()
        .filter_map(|si| {
            let id = text(si, "Id")?;
            let ap = elements(si, "AccessPolicy").first().copied().unwrap_or_default();
            let policy = AccessPolicy {
                start: text(ap, "Start").and_then(|s| s.parse().ok()),
                expiry: text(ap, "Expiry").and_then(|s| s.parse().ok()),
                permissions: Permissions::from_letters(&text(ap, "Permission").unwrap_or_default()),
            };
            Some((id, policy))
        })
        .collect()
}

/// `Set Container ACL` body
pub fn signed_identifiers(policies: &BTreeMap<String, AccessPolicy>) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><SignedIdentifiers>"#);
    for (id, policy) in policies {
        xml.push_str("<SignedIdentifier><Id>");
        xml.push_str(&escape(id));
        xml.push_str("</Id><AccessPolicy>");
        if let Some(start) = policy.start {
            xml.push_str(&format!("<Start>{}</Start>", start.strftime("%Y-%m-%dT%H:%M:%SZ")));
        }
        if let Some(expiry) = policy.expiry {
            xml.push_str(&format!("<Expiry>{}</Expiry>", expiry.strftime("%Y-%m-%dT%H:%M:%SZ")));
        }
        xml.push_str(&format!("<Permission>{}</Permission>", policy.permissions));
        xml.push_str("</AccessPolicy></SignedIdentifier>");
    }
    xml.push_str("</SignedIdentifiers>");
    xml
}

/// `Code: Message` from a service error body, if it has one
pub fn error_message(body: &str) -> Option<String> {
    let code = text(body, "Code")?;
    match text(body, "Message") {
        Some(message) => Some(format!("{code}: {}", message.lines().next().unwrap_or_default())),
        None => Some(code),
    }
}
