use url::Url;

use super::{BuildExecutor, DummyExecutor};

#[cfg(unix)]
use super::LocalExecutor;

/// Constructs a new instance of a [BuildExecutor] from an URI.
///
/// The following schemes are supported by the following executors:
/// - `dummy://` ([DummyExecutor])
/// - `local://` ([LocalExecutor]), optionally with a `shell` query parameter
///   pointing to the shell used to run commands, like
///   `local://?shell=/bin/bash`.
pub async fn from_addr(uri: &str) -> std::io::Result<Box<dyn BuildExecutor>> {
    let url = Url::parse(uri)
        .map_err(|e| std::io::Error::other(format!("unable to parse url: {}", e)))?;

    Ok(match url.scheme() {
        // dummy doesn't care about parameters.
        "dummy" => Box::<DummyExecutor>::default(),
        #[cfg(unix)]
        "local" => {
            if url.has_host() || !url.path().is_empty() {
                Err(std::io::Error::other("local doesn't support host or path"))?
            }

            match url.query_pairs().find(|(k, _)| k == "shell") {
                Some((_, shell)) if shell.is_empty() => {
                    Err(std::io::Error::other("shell must not be empty"))?
                }
                Some((_, shell)) => Box::new(LocalExecutor::new(shell.as_ref())),
                None => Box::<LocalExecutor>::default(),
            }
        }
        scheme => Err(std::io::Error::other(format!("unknown scheme: {}", scheme)))?,
    })
}
