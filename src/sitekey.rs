//! Ordering of search-console properties for multi-site reports.
//!
//! Properties come in two forms: domain properties (`sc-domain:example.com`) and
//! URL-prefix properties (`https://www.example.com/`). Sorting by [`SiteKey`]
//! groups every property of a root domain together, with the domain property
//! first, then the `www` prefix, then any other subdomain.

use std::cmp::Ordering;
use url::Url;

pub const DOMAIN_PROPERTY_PREFIX: &str = "sc-domain:";

/// Second-level labels that belong to the public suffix (`example.co.uk`).
const SECOND_LEVEL_SUFFIXES: [&str; 6] = ["co", "com", "org", "net", "gov", "edu"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyClass {
    Domain = 0,
    Www = 1,
    Subdomain = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiteKey {
    pub root_domain: String,
    pub class: PropertyClass,
    pub subdomain: String,
}

impl SiteKey {
    pub fn new(site_url: &str) -> Self {
        if let Some(domain) = site_url.strip_prefix(DOMAIN_PROPERTY_PREFIX) {
            return SiteKey {
                root_domain: root_domain(domain),
                class: PropertyClass::Domain,
                subdomain: String::new(),
            };
        }

        let host = property_host(site_url);
        let root = root_domain(&host);
        if host.starts_with("www.") {
            SiteKey {
                root_domain: root,
                class: PropertyClass::Www,
                subdomain: String::new(),
            }
        } else {
            let subdomain = if host == root {
                String::new()
            } else {
                host.split('.').next().unwrap_or_default().to_string()
            };
            SiteKey {
                root_domain: root,
                class: PropertyClass::Subdomain,
                subdomain,
            }
        }
    }
}

/// Host name of a property, without the `sc-domain:` marker.
pub fn property_host(site_url: &str) -> String {
    if let Some(domain) = site_url.strip_prefix(DOMAIN_PROPERTY_PREFIX) {
        return domain.to_lowercase();
    }
    match Url::parse(site_url) {
        Ok(url) => url.host_str().unwrap_or_default().to_lowercase(),
        // Not a URL; treat the whole value as a bare host.
        Err(_) => site_url.trim_matches('/').to_lowercase(),
    }
}

/// Registrable domain of `host`, keeping a known second-level suffix.
pub fn root_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let n = labels.len();
    if n > 2 && SECOND_LEVEL_SUFFIXES.contains(&labels[n - 2]) {
        labels[n - 3..].join(".")
    } else if n >= 2 {
        labels[n - 2..].join(".")
    } else {
        host.to_string()
    }
}

fn compare_sites(a: &str, b: &str) -> Ordering {
    SiteKey::new(a)
        .cmp(&SiteKey::new(b))
        .then_with(|| a.cmp(b))
}

/// Sorts properties by root domain, then precedence class, then subdomain.
pub fn sort_sites(sites: &mut [String]) {
    sites.sort_by(|a, b| compare_sites(a, b));
}

/// Groups already-sorted properties by root domain, preserving order.
pub fn group_by_root(sites: &[String]) -> Vec<(String, Vec<&String>)> {
    let mut groups: Vec<(String, Vec<&String>)> = Vec::new();
    for site in sites {
        let root = SiteKey::new(site).root_domain;
        match groups.last_mut() {
            Some((current, members)) if *current == root => members.push(site),
            _ => groups.push((root, vec![site])),
        }
    }
    groups
}
