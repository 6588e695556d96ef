//! Production collaborator implementations: `reqwest` for HTTP, `imagesize`
//! for pixel-dimension decoding, `std::fs` for the filesystem.

use crate::collaborators::{FileSystem, HttpClient, HttpResponse, ImageDecoder};
use crate::core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Blocking `reqwest` client, the way `examples/other_examples` manga
/// downloaders issue chapter-image GETs.
pub struct ReqwestHttpClient {
    client: reqwest::blocking::Client,
}

impl ReqwestHttpClient {
    /// Build a client with sensible defaults
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Error::Cache(crate::core::CacheError::network(e.to_string())))?;
        Ok(Self { client })
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new().expect("failed to build default reqwest client")
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get(&self, url: &str, headers: Option<&HashMap<String, String>>) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        let response = request
            .send()
            .map_err(|e| Error::Cache(crate::core::CacheError::network(e.to_string())))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| Error::Cache(crate::core::CacheError::network(e.to_string())))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// `std::fs`-backed filesystem collaborator.
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn make_directory(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::write(path, bytes)
    }

    fn delete(&self, path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn read_directory(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path)? {
            out.push(entry?.path());
        }
        Ok(out)
    }
}

/// Header-only pixel dimension decoder via the `imagesize` crate — avoids
/// decoding full pixel data just to learn width/height.
pub struct ImageSizeDecoder;

impl ImageDecoder for ImageSizeDecoder {
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let size = imagesize::size(path)
            .map_err(|e| Error::Cache(crate::core::CacheError::decode(e.to_string())))?;
        Ok((size.width as u32, size.height as u32))
    }
}
