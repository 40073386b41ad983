use crate::model::Domain;
use std::collections::HashSet;
use url::{ParseError, Url};

/// Derives candidate subdomain labels from raw result links.
///
/// A host counts only if it is the domain itself or ends with `.<domain>`;
/// the root domain leaves an empty remainder and is dropped. Unparseable
/// links are skipped one by one.
pub fn extract<I, S>(urls: I, domain: &Domain) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let suffix = format!(".{}", domain);

    urls.into_iter()
        .filter_map(|url| host_of(url.as_ref()))
        .filter_map(|host| {
            host.strip_suffix(suffix.as_str())
                .map(|remainder| remainder.trim_matches('.').to_string())
        })
        .filter(|candidate| !candidate.is_empty())
        .collect()
}

fn host_of(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = match Url::parse(raw) {
        Ok(url) => url,
        // protocol-relative links
        Err(ParseError::RelativeUrlWithoutBase) if raw.starts_with("//") => {
            Url::parse(&format!("https:{raw}")).ok()?
        }
        Err(_) => return None,
    };

    url.host_str()
        .map(|host| host.trim_end_matches('.').to_string())
}
