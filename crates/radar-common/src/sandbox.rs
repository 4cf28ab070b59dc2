use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::RadarError;

/// HTTP client that only allows requests to approved domains.
/// Every outbound call the pipeline makes goes through one of these.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default Academic Radar allowlist.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, RadarError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "api.openalex.org", // OpenAlex works search
            "localhost",        // Ollama local
            "127.0.0.1",        // Localhost alt
            "api.openai.com",   // OpenAI LLMs
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| RadarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allows the host of `url`, e.g. a self-hosted OpenAI-compatible endpoint.
    pub fn allow_url_host(&mut self, url: &str) -> Result<(), RadarError> {
        let parsed = Url::parse(url)
            .map_err(|e| RadarError::Config(format!("Invalid URL {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| RadarError::Config(format!("URL has no host: {}", url)))?;
        self.allow_domain(host);
        Ok(())
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, RadarError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, RadarError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }

    fn check(&self, url: &str) -> Result<(), RadarError> {
        if !self.is_allowed(url) {
            return Err(RadarError::Security(format!(
                "Network capabilities capped: domain not in allowlist for URL {}",
                url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SandboxClient {
        SandboxClient::new(Duration::from_secs(5), "AcademicRadar/test").unwrap()
    }

    #[test]
    fn test_openalex_is_allowed() {
        let c = client();
        assert!(c.is_allowed("https://api.openalex.org/works?search=graph"));
        assert!(c.is_allowed("http://localhost:11434/v1/chat/completions"));
    }

    #[test]
    fn test_unknown_domain_rejected() {
        let c = client();
        assert!(!c.is_allowed("https://evil.example.com/exfil"));
        assert!(!c.is_allowed("not a url"));
        assert!(matches!(
            c.get("https://evil.example.com/"),
            Err(RadarError::Security(_))
        ));
    }

    #[test]
    fn test_allow_url_host() {
        let mut c = client();
        c.allow_url_host("https://llm.internal.lab:8443/v1").unwrap();
        assert!(c.is_allowed("https://llm.internal.lab:8443/v1/chat/completions"));
        assert!(c.allow_url_host("::::").is_err());
    }
}
