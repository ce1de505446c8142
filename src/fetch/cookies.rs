//! Serializable cookie handling
//!
//! Cookies are kept as explicit records rather than inside an opaque jar so
//! the crawl state can persist them between runs and replay them into fresh
//! sessions. Bot-protection vendors identify solved challenges purely by
//! cookie presence, which is what `has_protection_cookies` checks.

use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};

/// Cookie name prefixes set by DDoS-Guard and Cloudflare challenge pages
const PROTECTION_PREFIXES: &[&str] = &[
    "__ddg",
    "ddg1",
    "ddg2",
    "ddg3",
    "ddg4",
    "ddg5",
    "cf_clearance",
    "cf_bm",
    "cf_chl_",
];

/// One persisted cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

fn default_path() -> String {
    "/".to_string()
}

/// Checks a cookie name against the known challenge-cookie shapes
pub fn is_protection_cookie(name: &str) -> bool {
    let lower = name.to_lowercase();
    if PROTECTION_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    lower.contains("ddos") && lower.contains("guard")
}

/// True when any record looks like a solved bot challenge
pub fn has_protection_cookies(records: &[CookieRecord]) -> bool {
    records.iter().any(|c| is_protection_cookie(&c.name))
}

/// In-memory cookie set for one host, replayed into every request
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    records: Vec<CookieRecord>,
}

impl CookieJar {
    /// Rebuilds a jar from persisted records
    pub fn from_records(records: Vec<CookieRecord>) -> Self {
        let mut jar = CookieJar::default();
        for record in records {
            jar.upsert(record);
        }
        jar
    }

    pub fn records(&self) -> &[CookieRecord] {
        &self.records
    }

    pub fn snapshot(&self) -> Vec<CookieRecord> {
        self.records.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts or replaces a cookie, keyed by name and domain
    pub fn upsert(&mut self, record: CookieRecord) {
        match self
            .records
            .iter_mut()
            .find(|c| c.name == record.name && c.domain == record.domain)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Replaces the whole jar, used after a solver acquired a fresh session
    pub fn replace_all(&mut self, records: Vec<CookieRecord>) {
        self.records.clear();
        for record in records {
            self.upsert(record);
        }
    }

    /// Absorbs every `Set-Cookie` header from a response
    pub fn absorb_response(&mut self, headers: &HeaderMap, host: &str) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(raw) = value.to_str() {
                if let Some(record) = parse_set_cookie(raw, host) {
                    self.upsert(record);
                }
            }
        }
    }

    /// Renders the `Cookie` request header, or `None` when the jar is empty
    pub fn header_value(&self) -> Option<String> {
        if self.records.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .records
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        Some(pairs.join("; "))
    }

    pub fn has_protection(&self) -> bool {
        has_protection_cookies(&self.records)
    }
}

/// Parses a single `Set-Cookie` header value
///
/// Only the attributes the persisted record carries are read; everything
/// else (SameSite, HttpOnly, Max-Age) is ignored. Malformed headers yield
/// `None` instead of an error since a bad cookie must not fail a fetch.
pub fn parse_set_cookie(raw: &str, default_domain: &str) -> Option<CookieRecord> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut record = CookieRecord {
        name: name.to_string(),
        value: value.trim().to_string(),
        domain: default_domain.to_string(),
        path: "/".to_string(),
        secure: false,
        expires: None,
    };

    for part in parts {
        let part = part.trim();
        if part.eq_ignore_ascii_case("secure") {
            record.secure = true;
            continue;
        }
        if let Some((key, val)) = part.split_once('=') {
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => {
                    let domain = val.trim().trim_start_matches('.');
                    if !domain.is_empty() {
                        record.domain = domain.to_string();
                    }
                }
                "path" => {
                    let path = val.trim();
                    if !path.is_empty() {
                        record.path = path.to_string();
                    }
                }
                "expires" => {
                    if let Ok(parsed) = chrono::DateTime::parse_from_rfc2822(val.trim()) {
                        record.expires = Some(parsed.timestamp());
                    }
                }
                _ => {}
            }
        }
    }

    Some(record)
}
