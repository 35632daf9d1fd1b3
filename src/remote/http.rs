use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use url::Url;
use crate::config::RemoteConfig;
use crate::queue::{Result, UploadError};
use super::{BlobOptions, BlobStore, FileRecord, FileRecordSink, IdentityProvider, User};

/// REST client for the hosted backend (auth, object storage and the file table)
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_key: String,
    access_token: Option<String>,
    bucket: String,
    files_table: String,
}

impl HttpBackend {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|_err| UploadError::ParamError(format!("Invalid url: {:?}", config.base_url)))?;

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            access_token: None,
            bucket: config.bucket.clone(),
            files_table: config.files_table.clone(),
        })
    }

    /// Session token of the signed-in user
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key).map_err(invalid_header)?);

        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(invalid_header)?,
        );

        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| UploadError::ParamError(format!("Invalid path {:?}: {}", path, err)))
    }

    pub(crate) fn user_url(&self) -> Result<Url> {
        self.endpoint("auth/v1/user")
    }

    pub(crate) fn object_url(&self, path: &str) -> Result<Url> {
        self.endpoint(&format!("storage/v1/object/{}/{}", self.bucket, path.trim_start_matches('/')))
    }

    pub(crate) fn table_url(&self) -> Result<Url> {
        self.endpoint(&format!("rest/v1/{}", self.files_table))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::server_error(status.as_u16(), error_message(&body)))
    }
}

fn invalid_header(err: reqwest::header::InvalidHeaderValue) -> UploadError {
    UploadError::ParamError(format!("Invalid header value: {}", err))
}

/// Pull the human readable part out of an error body
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl IdentityProvider for HttpBackend {
    async fn current_user(&self) -> Result<Option<User>> {
        if self.access_token.is_none() {
            return Ok(None);
        }

        let response = self
            .client
            .get(self.user_url()?)
            .headers(self.headers()?)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }

        let user = Self::check(response).await?.json::<User>().await?;
        Ok(Some(user))
    }
}

#[async_trait]
impl BlobStore for HttpBackend {
    async fn upload(&self, path: &str, payload: Bytes, options: &BlobOptions) -> Result<()> {
        let mut headers = self.headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(&options.content_type).map_err(invalid_header)?);
        headers.insert(CACHE_CONTROL, HeaderValue::from_str(&format!("max-age={}", options.cache_control)).map_err(invalid_header)?);
        headers.insert("x-upsert", HeaderValue::from_static(if options.upsert { "true" } else { "false" }));

        let response = self
            .client
            .post(self.object_url(path)?)
            .headers(headers)
            .body(payload)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl FileRecordSink for HttpBackend {
    async fn insert_file_record(&self, record: &FileRecord) -> Result<()> {
        let mut headers = self.headers()?;
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));

        let response = self
            .client
            .post(self.table_url()?)
            .headers(headers)
            .json(record)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
