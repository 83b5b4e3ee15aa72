//! HTTP client for the certificate backend.
//!
//! Every endpoint the renderer consumes goes through [`ApiClient`]: the
//! authenticated record and QR lookups, the public template assets, the
//! verification lookup and any remote images a template embeds.

use std::time::Duration;

use base64::Engine as _;
use log::debug;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use crate::record::CertificateRecord;
use crate::{Error, RendererConfig, Result};

#[derive(Debug, Deserialize)]
struct QrCodeBody {
    #[serde(rename = "qrCodeDataUrl", default)]
    qr_code_data_url: String,
}

/// Thin async client over the backend's REST endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    api_base: Url,
    assets_base: Url,
    token: Option<String>,
    user_agent: String,
}

impl ApiClient {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        let api_base = Url::parse(&config.api_base_url)
            .map_err(|e| Error::Config(format!("api_base_url: {}", e)))?;
        let assets_base = Url::parse(&config.assets_base_url)
            .map_err(|e| Error::Config(format!("assets_base_url: {}", e)))?;
        Ok(Self {
            http,
            api_base,
            assets_base,
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// `GET {api}/certificate/{request_id}`
    pub async fn fetch_record(&self, request_id: &str) -> Result<CertificateRecord> {
        let what = format!("certificate record {}", request_id);
        let url = join_segments(&self.api_base, &["certificate", request_id])?;
        let resp = self.get(url, true, &what).await?;
        resp.json::<CertificateRecord>()
            .await
            .map_err(|e| Error::fetch(what, e))
    }

    /// `GET {api}/qrcode/{hash}`, returned as a data URL.
    ///
    /// The backend answers either with JSON carrying `qrCodeDataUrl` or with
    /// the image itself.
    pub async fn fetch_qr_code(&self, hash: &str) -> Result<String> {
        let what = format!("QR code for {}", hash);
        let url = join_segments(&self.api_base, &["qrcode", hash])?;
        let resp = self.get(url, true, &what).await?;
        let content_type = content_type(&resp);
        if content_type.starts_with("image/") {
            let bytes = resp.bytes().await.map_err(|e| Error::fetch(&what, e))?;
            return Ok(data_url(&content_type, &bytes));
        }
        let body: QrCodeBody = resp.json().await.map_err(|e| Error::fetch(&what, e))?;
        if body.qr_code_data_url.trim().is_empty() {
            return Err(Error::fetch(what, "response carried no qrCodeDataUrl"));
        }
        Ok(body.qr_code_data_url)
    }

    /// `GET {assets}/templates/{file}`
    pub async fn fetch_template(&self, file: &str) -> Result<String> {
        let what = format!("template {}", file);
        let url = join_segments(&self.assets_base, &["templates", file])?;
        self.get_text(url, &what).await
    }

    /// `GET {assets}/templates/styles.css`
    pub async fn fetch_stylesheet(&self) -> Result<String> {
        let url = join_segments(&self.assets_base, &["templates", "styles.css"])?;
        self.get_text(url, "stylesheet").await
    }

    /// Fetch an image a template references. Returns the bytes and content type.
    pub async fn fetch_asset(&self, url: Url) -> Result<(Vec<u8>, String)> {
        let what = url.to_string();
        let resp = self.get(url, false, &what).await?;
        let content_type = content_type(&resp);
        let bytes = resp.bytes().await.map_err(|e| Error::fetch(&what, e))?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Base URL relative image sources in templates are resolved against.
    pub fn templates_base(&self) -> Result<Url> {
        join_segments(&self.assets_base, &["templates", ""])
    }

    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<Url> {
        join_segments(&self.api_base, segments)
    }

    pub(crate) async fn get(&self, url: Url, authenticated: bool, what: &str) -> Result<Response> {
        let resp = self.send(url, authenticated, what).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::fetch(what, format!("HTTP {}", status)));
        }
        Ok(resp)
    }

    /// Issue a GET without judging the status code.
    pub(crate) async fn send(&self, url: Url, authenticated: bool, what: &str) -> Result<Response> {
        debug!("GET {}", url);
        let mut req = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str());
        if authenticated {
            if let Some(token) = &self.token {
                req = req.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }
        req.send().await.map_err(|e| Error::fetch(what, e))
    }

    async fn get_text(&self, url: Url, what: &str) -> Result<String> {
        let resp = self.get(url, false, what).await?;
        resp.text().await.map_err(|e| Error::fetch(what, e))
    }
}

/// Append path segments (percent-encoded) to a base URL.
fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn content_type(resp: &Response) -> String {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Encode bytes as a base64 data URL.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_appended_and_encoded() {
        let base = Url::parse("http://localhost:5000/api").unwrap();
        let url = join_segments(&base, &["qrcode", "ab/c d"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/qrcode/ab%2Fc%20d");

        let trailing = Url::parse("http://localhost:5000/").unwrap();
        let url = join_segments(&trailing, &["templates", "noc.html"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/templates/noc.html");
    }

    #[test]
    fn templates_base_ends_with_slash() {
        let client = ApiClient::new(&RendererConfig::default()).unwrap();
        let base = client.templates_base().unwrap();
        assert_eq!(base.as_str(), "http://127.0.0.1:5000/templates/");
        assert_eq!(base.join("logo.png").unwrap().as_str(), "http://127.0.0.1:5000/templates/logo.png");
    }

    #[test]
    fn data_url_encodes_bytes() {
        assert_eq!(data_url("image/png", b"hi"), "data:image/png;base64,aGk=");
        assert!(data_url("", b"").starts_with("data:application/octet-stream;base64,"));
    }
}
