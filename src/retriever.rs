//! Retrievers fetch the raw flag file.
use std::{collections::HashMap, path::PathBuf, time::Duration};

use reqwest::{Method, Url};

use crate::{Error, Result};

/// A component that fetches the raw content of the flag file.
///
/// `retrieve()` is called once when the client is created and then on every polling tick, always
/// from a single thread at a time.
pub trait Retriever: Send + Sync {
    /// Fetch the raw flag file.
    fn retrieve(&self) -> Result<Vec<u8>>;
}

impl<T: Fn() -> Result<Vec<u8>> + Send + Sync> Retriever for T {
    fn retrieve(&self) -> Result<Vec<u8>> {
        self()
    }
}

/// Reads the flag file from the local file system.
#[derive(Debug, Clone)]
pub struct FileRetriever {
    path: PathBuf,
}

impl FileRetriever {
    /// Create a retriever reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> FileRetriever {
        FileRetriever { path: path.into() }
    }
}

impl Retriever for FileRetriever {
    fn retrieve(&self) -> Result<Vec<u8>> {
        log::debug!(target: "flagsync", path:? = self.path; "reading flag file");
        Ok(std::fs::read(&self.path)?)
    }
}

/// Fetches the flag file from an HTTP endpoint.
pub struct HttpRetriever {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    url: Url,
    method: Method,
    body: Option<String>,
    headers: HashMap<String, String>,
}

impl HttpRetriever {
    /// Default timeout of a single request.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a retriever issuing `GET url`.
    pub fn new(url: &str) -> Result<HttpRetriever> {
        HttpRetriever::with_timeout(url, HttpRetriever::DEFAULT_TIMEOUT)
    }

    /// Create a retriever issuing `GET url` with a custom request timeout.
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<HttpRetriever> {
        let url = Url::parse(url).map_err(Error::InvalidRetrieverUrl)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(HttpRetriever {
            client,
            url,
            method: Method::GET,
            body: None,
            headers: HashMap::new(),
        })
    }

    /// Use `method` instead of `GET`.
    pub fn method(mut self, method: Method) -> HttpRetriever {
        self.method = method;
        self
    }

    /// Send `body` with every request.
    pub fn body(mut self, body: impl Into<String>) -> HttpRetriever {
        self.body = Some(body.into());
        self
    }

    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> HttpRetriever {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl Retriever for HttpRetriever {
    fn retrieve(&self) -> Result<Vec<u8>> {
        log::debug!(target: "flagsync", url = self.url.as_str(); "fetching flag file");

        let mut request = self.client.request(self.method.clone(), self.url.clone());
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            log::warn!(target: "flagsync", "received non-200 response while fetching flag file: {:?}", status);
            return Err(Error::UnexpectedStatus(status.as_u16()));
        }

        Ok(response.bytes()?.to_vec())
    }
}
