//! Threat-intelligence provider registry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Static description of a provider and its storage slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Stable identifier used on the wire and in events
    pub key: &'static str,
    /// Storage slot holding the credential
    pub storage_key: &'static str,
    /// Legacy slot mirrored on write and consulted on read
    pub fallback_key: Option<&'static str>,
    /// Display name
    pub name: &'static str,
    pub description: &'static str,
}

/// A named third-party threat-intelligence service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Internet-device search service (primary/legacy provider)
    Shodan,
    VirusTotal,
    AbuseIpDb,
}

const SHODAN: ProviderConfig = ProviderConfig {
    key: "shodan",
    storage_key: "shodanApiKey",
    fallback_key: Some("apiKey"),
    name: "Shodan",
    description: "Internet-connected device search engine",
};

const VIRUSTOTAL: ProviderConfig = ProviderConfig {
    key: "virustotal",
    storage_key: "virusTotalApiKey",
    fallback_key: None,
    name: "VirusTotal",
    description: "File and URL analysis service",
};

const ABUSEIPDB: ProviderConfig = ProviderConfig {
    key: "abuseipdb",
    storage_key: "abuseIPDBApiKey",
    fallback_key: None,
    name: "AbuseIPDB",
    description: "IP reputation and abuse reporting",
};

impl Provider {
    /// All providers in priority order (primary first)
    pub const ALL: [Provider; 3] = [Provider::Shodan, Provider::VirusTotal, Provider::AbuseIpDb];

    /// The provider whose key is preferred as the primary credential
    pub const PRIMARY: Provider = Provider::Shodan;

    pub fn config(self) -> &'static ProviderConfig {
        match self {
            Provider::Shodan => &SHODAN,
            Provider::VirusTotal => &VIRUSTOTAL,
            Provider::AbuseIpDb => &ABUSEIPDB,
        }
    }

    pub fn key(self) -> &'static str {
        self.config().key
    }

    pub fn name(self) -> &'static str {
        self.config().name
    }

    /// Provider owning a storage slot (primary or fallback), if any
    pub fn for_slot(slot: &str) -> Option<Provider> {
        Provider::ALL.into_iter().find(|p| {
            let cfg = p.config();
            cfg.storage_key == slot || cfg.fallback_key == Some(slot)
        })
    }
}

/// Whether a storage slot name looks like a credential slot
///
/// Matches every provider slot plus slots written by other versions of the
/// dashboard (`...ApiKey` naming).
pub fn is_credential_slot(slot: &str) -> bool {
    slot.contains("ApiKey") || slot == "apiKey"
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.key() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown provider: {}", s)))
    }
}
