use crate::{Error, Result};
use lazy_regex::regex_is_match;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fmt::Write as FmtWrite;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use url::{form_urlencoded, Url};

// region:        --- Models

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const TEMPLATE_SLOT: &str = "{}";

/// Validated root domain, the enumeration target.
///
/// Stored lowercase without a trailing dot, which is the shape URL hosts
/// take once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain(String);

impl Domain {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let name = trimmed.strip_suffix('.').unwrap_or(trimmed).to_lowercase();

        if name.is_empty() {
            return Err(Error::InvalidDomain("empty domain".into()));
        }
        if name.len() > MAX_DOMAIN_LEN {
            return Err(Error::InvalidDomain(format!(
                "{name:?} is longer than {MAX_DOMAIN_LEN} characters"
            )));
        }

        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 2 {
            return Err(Error::InvalidDomain(format!(
                "{name:?} is not a registrable domain (expected e.g. example.com)"
            )));
        }
        for label in labels {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(Error::InvalidDomain(format!(
                    "{name:?} has an empty or oversized label"
                )));
            }
            if !regex_is_match!(r"^[a-z0-9_](?:[a-z0-9_-]*[a-z0-9_])?$", label) {
                return Err(Error::InvalidDomain(format!(
                    "{name:?} has an invalid label {label:?}"
                )));
            }
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Search engine URL pattern with exactly one `{}` slot for the escaped query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTemplate {
    template: String,
    name: String,
}

impl EngineTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let template = raw.trim().to_string();
        let slots = template.matches(TEMPLATE_SLOT).count();
        if slots != 1 {
            return Err(Error::InvalidEngineTemplate(format!(
                "{template:?} must contain exactly one {TEMPLATE_SLOT} placeholder (found {slots})"
            )));
        }

        let sample = template.replace(TEMPLATE_SLOT, "sample");
        let url = Url::parse(&sample)
            .map_err(|err| Error::InvalidEngineTemplate(format!("{template:?}: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidEngineTemplate(format!(
                "{template:?} is not an http(s) url"
            )));
        }
        let name = match url.host_str() {
            Some(host) => host.to_string(),
            None => {
                return Err(Error::InvalidEngineTemplate(format!(
                    "{template:?} has no host"
                )))
            }
        };

        Ok(Self { template, name })
    }

    /// Engine host, used to label logs and per-engine results.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Request url for `domain`, form-encoded into the slot.
    pub fn render(&self, domain: &Domain) -> String {
        let escaped: String = form_urlencoded::byte_serialize(domain.as_str().as_bytes()).collect();
        self.template.replacen(TEMPLATE_SLOT, &escaped, 1)
    }
}

/// Fully-qualified hostname which resolved at least once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConfirmedSubdomain(String);

impl ConfirmedSubdomain {
    pub(crate) fn new(fqdn: String) -> Self {
        Self(fqdn)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfirmedSubdomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Txt,
}

impl OutputFormat {
    pub const VALUES: [&'static str; 3] = ["json", "csv", "txt"];
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "txt" => Ok(Self::Txt),
            other => Err(Error::CliUsage(format!("unknown output format {other:?}"))),
        }
    }
}

// endregion:     --- Models

// region:        --- Exporting utils

pub fn ensure_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        Ok(false)
    } else {
        fs::create_dir_all(dir)?;
        Ok(true)
    }
}

pub fn render(format: OutputFormat, subdomains: &[ConfirmedSubdomain]) -> Result<String> {
    let mut content = String::new();
    match format {
        OutputFormat::Json => content = to_json(subdomains)?,
        OutputFormat::Csv => {
            writeln!(&mut content, "Subdomain")?;
            for subdomain in subdomains {
                writeln!(&mut content, "{}", subdomain)?;
            }
        }
        OutputFormat::Txt => {
            for subdomain in subdomains {
                writeln!(&mut content, "{}", subdomain)?;
            }
        }
    }
    Ok(content)
}

/// Json array indented with four spaces.
fn to_json(subdomains: &[ConfirmedSubdomain]) -> Result<String> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    subdomains.serialize(&mut serializer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn export(subdomains: &[ConfirmedSubdomain], format: OutputFormat, path: &Path) -> Result<()> {
    let content = render(format, subdomains)?;
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

// endregion:     --- Exporting utils
