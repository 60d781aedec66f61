use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::archive::{entry_name, ArchiveBuilder};
use super::{clean_entry_path, ObjectStore, ObjectStoreError};
use crate::OwnerId;

const API_BASE: &str = "https://storage.googleapis.com/storage/v1/b";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Google Cloud Storage backend.
///
/// Objects are named `<owner>/<path>`. Buckets have no real directories, so a
/// directory is just the prefix `<owner>/<path>/`.
pub struct GcsStore {
    bucket: String,
    client: Client,
    token: tokio::sync::RwLock<AccessToken>,
    credentials_file: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let store = Self {
            bucket: bucket.to_string(),
            client: Client::builder().build()?,
            token: tokio::sync::RwLock::new(AccessToken {
                value: String::new(),
                expires_at: Utc::now(),
            }),
            credentials_file: credentials_file.map(|s| s.to_string()),
        };

        store.bearer().await?;
        Ok(store)
    }

    /// Current access token, refreshed a minute before it expires.
    async fn bearer(&self) -> Result<String, ObjectStoreError> {
        {
            let token = self.token.read().await;
            if token.expires_at - Duration::seconds(60) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let mut token = self.token.write().await;
        if token.expires_at - Duration::seconds(60) > Utc::now() {
            return Ok(token.value.clone());
        }

        let fetched = match self.credentials_file {
            Some(ref path) => self.token_from_service_account(path).await,
            None => self.token_from_metadata_server().await,
        }
        .map_err(|e| ObjectStoreError::Backend(format!("GCS authentication failed: {e}")))?;

        token.value = fetched.access_token;
        token.expires_at = Utc::now() + Duration::seconds(fetched.expires_in);
        tracing::debug!(expires_at = %token.expires_at, "Refreshed GCS access token");
        Ok(token.value.clone())
    }

    async fn token_from_service_account(&self, path: &str) -> Result<TokenResponse, anyhow::Error> {
        let key: ServiceAccountKey = serde_json::from_str(&tokio::fs::read_to_string(path).await?)?;

        let now = Utc::now().timestamp();
        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let claims = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        }))?);
        let unsigned = format!("{header}.{claims}");
        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let assertion = format!("{unsigned}.{}", base64_url_encode(&signature));

        let token = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(token)
    }

    async fn token_from_metadata_server(&self) -> Result<TokenResponse, anyhow::Error> {
        let token = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(token)
    }

    fn object_name(owner: OwnerId, path: &str) -> Result<String, ObjectStoreError> {
        Ok(format!("{owner}/{}", clean_entry_path(path)?))
    }

    fn prefix(owner: OwnerId, path: &str) -> Result<String, ObjectStoreError> {
        Ok(format!("{}/", Self::object_name(owner, path)?))
    }

    /// `<base>/<bucket>/o[/<segments>...]`, each segment percent-encoded.
    fn url(&self, base: &str, segments: &[&str]) -> Result<Url, ObjectStoreError> {
        let mut url = Url::parse(base).map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Backend(format!("invalid base url {base}")))?
            .push(&self.bucket)
            .push("o")
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
        name: &str,
    ) -> Result<Response, ObjectStoreError> {
        let token = self.bearer().await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS {action} failed ({status}): {body}"
            )));
        }
        Ok(resp)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.url(API_BASE, &[])?;
            url.query_pairs_mut().append_pair("prefix", prefix);
            if let Some(ref token) = page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: ObjectList = self
                .send(self.client.get(url), "list", prefix)
                .await?
                .json()
                .await
                .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(names),
            }
        }
    }

    async fn download(&self, name: &str) -> Result<Bytes, ObjectStoreError> {
        let mut url = self.url(API_BASE, &[name])?;
        url.query_pairs_mut().append_pair("alt", "media");
        self.send(self.client.get(url), "download", name)
            .await?
            .bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn remove(&self, name: &str) -> Result<(), ObjectStoreError> {
        let url = self.url(API_BASE, &[name])?;
        match self.send(self.client.delete(url), "delete", name).await {
            Ok(_) | Err(ObjectStoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), ObjectStoreError> {
        let mut url = self.url(API_BASE, &[from, "copyTo", "b"])?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Backend("invalid copy url".to_string()))?
            .push(&self.bucket)
            .push("o")
            .push(to);
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_LENGTH, 0);
        self.send(request, "copy", from).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn save(&self, owner: OwnerId, path: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let name = Self::object_name(owner, path)?;
        let mut url = self.url(UPLOAD_BASE, &[])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &name);

        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        self.send(request, "upload", &name).await?;
        Ok(())
    }

    async fn read(&self, owner: OwnerId, path: &str) -> Result<Bytes, ObjectStoreError> {
        let name = Self::object_name(owner, path)?;
        self.download(&name).await.map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ObjectStoreError::NotFound(path.to_string()),
            e => e,
        })
    }

    async fn delete(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        self.remove(&Self::object_name(owner, path)?).await
    }

    async fn exists(&self, owner: OwnerId, path: &str) -> Result<bool, ObjectStoreError> {
        let name = Self::object_name(owner, path)?;
        let url = self.url(API_BASE, &[name.as_str()])?;
        match self.send(self.client.get(url), "stat", &name).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound(_)) => {
                // A directory exists when anything lives under its prefix.
                Ok(!self.list(&Self::prefix(owner, path)?).await?.is_empty())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        // Prefixes come into existence with their first object.
        clean_entry_path(path)?;
        tracing::trace!(owner, path, "GCS directories are implicit");
        Ok(())
    }

    async fn delete_dir(&self, owner: OwnerId, path: &str) -> Result<(), ObjectStoreError> {
        for name in self.list(&Self::prefix(owner, path)?).await? {
            self.remove(&name).await?;
        }
        Ok(())
    }

    async fn move_file(
        &self,
        owner: OwnerId,
        from: &str,
        to: &str,
    ) -> Result<(), ObjectStoreError> {
        let source = Self::object_name(owner, from)?;
        let target = Self::object_name(owner, to)?;
        self.copy(&source, &target).await?;
        self.remove(&source).await
    }

    async fn move_dir(&self, owner: OwnerId, from: &str, to: &str) -> Result<(), ObjectStoreError> {
        let source = Self::prefix(owner, from)?;
        let target = Self::prefix(owner, to)?;
        if target.starts_with(&source) {
            return Err(ObjectStoreError::InvalidPath(format!(
                "cannot move '{from}' into itself"
            )));
        }

        for name in self.list(&source).await? {
            let relative = &name[source.len()..];
            self.copy(&name, &format!("{target}{relative}")).await?;
            self.remove(&name).await?;
        }
        Ok(())
    }

    async fn zip_dir(
        &self,
        owner: OwnerId,
        path: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), ObjectStoreError> {
        let dir = clean_entry_path(path)?;
        let prefix = Self::prefix(owner, &dir)?;
        let mut names = self.list(&prefix).await?;
        names.sort();

        // One object is held in memory at a time; the archive itself is
        // spooled to disk off the async workers.
        let mut archive = spool(ArchiveBuilder::new).await?;
        for name in names {
            let data = self.download(&name).await?;
            let entry = entry_name(&dir, &name[prefix.len()..]);
            archive = spool(move || {
                archive.add(&entry, &mut &data[..])?;
                Ok(archive)
            })
            .await?;
        }
        let archive = spool(move || archive.finish()).await?;

        let mut archive = tokio::fs::File::from_std(archive);
        tokio::io::copy(&mut archive, &mut *out).await?;
        out.flush().await?;
        Ok(())
    }
}

async fn spool<T, F>(task: F) -> Result<T, ObjectStoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ObjectStoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ObjectStoreError::Backend(format!("archive task failed: {e}")))?
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Sign `data` with the PKCS#8 PEM key of a service account.
fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    use base64::Engine;

    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::engine::general_purpose::STANDARD.decode(der_b64.trim())?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}
