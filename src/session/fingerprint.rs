use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{InjectionPoint, RequestModel};

/// Stable identity of a request: method, normalized URL and body.
pub fn target_fingerprint(request: &RequestModel) -> String {
    digest(&canonical(request))
}

/// Stable identity of one injection point within a request.
pub fn fingerprint(request: &RequestModel, point: &InjectionPoint) -> String {
    let mut material = canonical(request);
    material.push('\n');
    material.push_str(&format!("{}:{}", point.location, point.name));
    digest(&material)
}

fn canonical(request: &RequestModel) -> String {
    format!(
        "{}\n{}\n{}",
        request.method.to_ascii_uppercase(),
        normalize_url(&request.url),
        request.body.as_deref().unwrap_or("").trim()
    )
}

/// Lower-cased scheme and host, default port dropped, fragment removed and
/// query pairs sorted by name.
fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.trim().to_string();
    };
    url.set_fragment(None);
    let mut pairs: Vec<(String, String)> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

fn digest(material: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(material.as_bytes()))
}
