use url::Url;

const MASK: &str = "***";

/// Strip the userinfo part of a locator so it can be logged.
///
/// Unparseable input is replaced entirely since it may still hold credentials.
pub fn redact_uri(uri: &str) -> String {
    let Ok(mut url) = Url::parse(uri) else {
        return "<unparseable url>".to_string();
    };

    if !url.username().is_empty() || url.password().is_some() {
        _ = url.set_password(None);
        _ = url.set_username(MASK);
    }
    url.to_string()
}

/// Keep the first two characters of a secret key and mask the rest.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(2).collect();
    format!("{prefix}{MASK}")
}

/// Mask the key segment of an ingest locator, `<ingest>/<key>`.
pub fn mask_destination(destination: &str) -> String {
    match destination.rsplit_once('/') {
        Some((ingest, key)) => format!("{ingest}/{}", mask_key(key)),
        None => mask_key(destination),
    }
}

/// Replaces known source locators and destination locators in free text.
///
/// Keys are only matched as part of their full destination locator, so a
/// short key never clobbers unrelated text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Redactor {
    uris: Vec<(String, String)>,
    destinations: Vec<(String, String)>,
}

impl Redactor {
    pub fn new<'a>(
        uris: impl IntoIterator<Item = &'a str>,
        destinations: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let uris = uris
            .into_iter()
            .filter(|uri| !uri.is_empty())
            .map(|uri| (uri.to_string(), redact_uri(uri)))
            .collect();
        let destinations = destinations
            .into_iter()
            .filter(|destination| !destination.is_empty())
            .map(|destination| (destination.to_string(), mask_destination(destination)))
            .collect();
        Self { uris, destinations }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut text = text.to_string();
        for (secret, masked) in self.uris.iter().chain(self.destinations.iter()) {
            if text.contains(secret.as_str()) {
                text = text.replace(secret.as_str(), masked);
            }
        }
        text
    }

    pub fn apply_all(&self, argv: &[String]) -> Vec<String> {
        argv.iter().map(|arg| self.apply(arg)).collect()
    }
}
