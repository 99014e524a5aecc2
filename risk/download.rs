// ========================================================================================
//
//                              Artifact file downloader
//
// ========================================================================================

use dwldutil::{DLFile, Downloader};
use indicatif::ProgressStyle;
use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

// ========================================================================================
//                              Public API
// ========================================================================================

/// Anything able to copy a remote blob into a local file.
///
/// The loader only ever calls this for files that are absent, so implementations
/// do not need to be idempotent themselves.
pub trait ArtifactFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), DownloadError>;
}

/// What `ensure_present` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded,
}

/// Makes sure `path` exists, downloading it from `url` if it does not.
///
/// A file that is already present is reused as-is; nothing is re-fetched or
/// verified. Downloads land in a `.part` sibling first and are moved into place
/// only once complete, so an interrupted run never leaves a truncated artifact
/// that a later run would mistake for a good one.
pub fn ensure_present(
    fetcher: &dyn ArtifactFetcher,
    url: Option<&str>,
    path: &Path,
) -> Result<FetchOutcome, DownloadError> {
    if path.is_file() {
        log::debug!("Reusing local artifact {}", path.display());
        return Ok(FetchOutcome::AlreadyPresent);
    }

    let url = url.ok_or_else(|| DownloadError::NoRemote(path.to_path_buf()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DownloadError::Io(e, parent.to_path_buf()))?;
    }

    let partial = partial_path(path);
    if partial.exists() {
        fs::remove_file(&partial).map_err(|e| DownloadError::Io(e, partial.clone()))?;
    }

    let resolved = direct_download_url(url);
    eprintln!("> Downloading {} from {}", path.display(), resolved);
    if let Err(e) = fetcher.fetch(&resolved, &partial) {
        // Whatever reached disk belongs to a failed attempt and must not be renamed later.
        if partial.exists() {
            if let Err(cleanup) = fs::remove_file(&partial) {
                log::warn!("Could not remove partial download {}: {cleanup}", partial.display());
            }
        }
        return Err(e);
    }

    if !partial.is_file() {
        return Err(DownloadError::Incomplete(path.to_path_buf()));
    }
    fs::rename(&partial, path).map_err(|e| DownloadError::Io(e, path.to_path_buf()))?;
    log::info!("Stored artifact at {}", path.display());
    Ok(FetchOutcome::Downloaded)
}

/// Rewrites Google Drive share links (`.../file/d/<id>/view?...`) into their
/// direct-download form. Every other URL is returned unchanged.
pub fn direct_download_url(url: &str) -> String {
    const SHARE_PREFIX: &str = "https://drive.google.com/file/d/";
    match url.strip_prefix(SHARE_PREFIX) {
        Some(rest) => {
            let id = rest.split(['/', '?']).next().unwrap_or_default();
            if id.is_empty() {
                url.to_string()
            } else {
                format!("https://drive.google.com/uc?export=download&id={id}")
            }
        }
        None => url.to_string(),
    }
}

/// Downloads over HTTP(S) with a terminal spinner.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl ArtifactFetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), DownloadError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(DownloadError::RuntimeCreation)?;

        runtime.block_on(async {
            // Only set once the body has been read to the end.
            let completed = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&completed);
            let file = DLFile::new()
                .with_url(url)
                .with_path(&destination.to_string_lossy())
                .with_on_download(Arc::new(move |_: String| flag.store(true, Ordering::SeqCst)));

            // A spinner, since the servers involved rarely report a content length.
            let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .map_err(|e| DownloadError::Network(e.to_string()))?
                .progress_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

            let downloader = Downloader::new()
                .add_file(file)
                .with_style(style)
                .with_max_concurrent_downloads(1)
                .with_max_redirections(5);

            // The downloader panics instead of returning an error when the server
            // cannot be reached, and drops the error of a broken stream.
            panic::catch_unwind(AssertUnwindSafe(|| downloader.start()))
                .map_err(|payload| DownloadError::Network(panic_message(payload.as_ref())))?;

            if !completed.load(Ordering::SeqCst) {
                return Err(DownloadError::Network(format!(
                    "download from {url} was interrupted before the end of the file"
                )));
            }
            Ok(())
        })
    }
}

// ========================================================================================
//                             Private Implementation
// ========================================================================================

/// A specialized error type for the fetch-if-absent workflow.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("I/O error for '{1}': {0}")]
    Io(#[source] io::Error, PathBuf),
    #[error("Network download failed: {0}")]
    Network(String),
    #[error(
        "'{0}' is missing and no remote location is configured for it; set model_url/features_url under [artifacts] in the settings file or CARDIORISK_MODEL_URL/CARDIORISK_FEATURES_URL"
    )]
    NoRemote(PathBuf),
    #[error("No file was received for '{0}'; the server may have refused the request")]
    Incomplete(PathBuf),
    #[error("Failed to create async runtime: {0}")]
    RuntimeCreation(#[source] io::Error),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|msg| msg.to_string()))
        .unwrap_or_else(|| "the downloader stopped unexpectedly".to_string())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
