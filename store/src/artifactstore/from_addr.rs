use url::Url;

use super::{ArtifactStore, CouchArtifactStore, MemoryArtifactStore};
use crate::Error;

/// Constructs a new instance of an [ArtifactStore] from an URI.
///
/// The following schemes are supported by the following services:
/// - `memory://` ([MemoryArtifactStore])
/// - `couchdb+http://`, `couchdb+https://` ([CouchArtifactStore])
/// - `http://`, `https://` ([CouchArtifactStore]), so a plain CouchDB or
///   Cloudant URL can be passed as is.
///
/// Credentials embedded in the URL are used to authenticate against CouchDB.
pub async fn from_addr(uri: &str) -> Result<Box<dyn ArtifactStore>, Error> {
    let url =
        Url::parse(uri).map_err(|e| Error::InvalidRequest(format!("unable to parse url: {}", e)))?;

    let artifact_store: Box<dyn ArtifactStore> = match url.scheme() {
        "memory" => {
            // memory doesn't support host or path in the URL.
            if url.has_host() || !url.path().is_empty() {
                return Err(Error::InvalidRequest("invalid url".to_string()));
            }
            Box::<MemoryArtifactStore>::default()
        }
        "http" | "https" => Box::new(CouchArtifactStore::from_url(&url)?),
        scheme if scheme.starts_with("couchdb+") => {
            // We need to convert the URL to string, strip the prefix there, and then
            // parse it back as url, as Url::set_scheme() rejects some of the transitions we want to do.
            let trimmed_url = url
                .as_str()
                .strip_prefix("couchdb+")
                .and_then(|s| Url::parse(s).ok())
                .ok_or_else(|| Error::InvalidRequest("invalid url".to_string()))?;
            Box::new(CouchArtifactStore::from_url(&trimmed_url)?)
        }
        scheme => {
            return Err(Error::InvalidRequest(format!(
                "unknown scheme: {}",
                scheme
            )))
        }
    };

    Ok(artifact_store)
}
