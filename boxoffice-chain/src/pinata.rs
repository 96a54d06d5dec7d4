//! Pinning ticket artwork to IPFS through Pinata.

use std::path::Path;

use reqwest::{multipart, Client};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::provider::ProviderError;

pub const UPLOAD_URL: &str = "https://uploads.pinata.cloud/v3/files";
pub const DEFAULT_GATEWAY: &str = "https://gateway.pinata.cloud/ipfs/";

#[derive(Debug, Clone)]
pub struct PinataClient {
    client: Client,
    jwt: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadedFile,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    cid: String,
}

impl PinataClient {
    pub fn new(jwt: impl Into<String>) -> Self {
        Self::with_upload_url(jwt, UPLOAD_URL)
    }

    pub fn with_upload_url(jwt: impl Into<String>, upload_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            jwt: jwt.into(),
            upload_url: upload_url.into(),
        }
    }

    /// Uploads a file to the public IPFS network and returns its CID.
    #[instrument(skip(self))]
    pub async fn pin_file(&self, path: &Path) -> Result<String, ProviderError> {
        let bytes = tokio::fs::read(path).await?;

        let name = path
            .file_name()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = multipart::Part::bytes(bytes).file_name(name.clone());

        let form = multipart::Form::new()
            .part("file", part)
            .text("network", "public")
            .text("name", name);

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                code: status.as_u16(),
                text,
            });
        }

        let uploaded: UploadResponse = serde_json::from_str(&text)?;
        info!(cid = %uploaded.data.cid, "pinned file");

        Ok(uploaded.data.cid)
    }
}

/// Turns a stored image reference (`ipfs://<cid>`, a bare CID or an http
/// URL) into something a browser can fetch.
pub fn gateway_url(gateway: &str, reference: &str) -> Option<String> {
    if reference.is_empty() {
        return None;
    }

    if reference.starts_with("http") {
        return Some(reference.to_string());
    }

    let cid = reference.strip_prefix("ipfs://").unwrap_or(reference);
    let gateway = gateway.trim_end_matches('/');

    Some(format!("{gateway}/{cid}"))
}
