pub mod cache;
pub mod config;
pub mod install;
pub mod scripts;

use crate::settings::Settings;
use frk_core::archive::ZipUnpacker;
use frk_core::cache::CacheManager;
use frk_core::fetch::{Fetcher, HttpFetcher, Offline};
use frk_core::types::{ArtifactSource, Channel};
use std::path::PathBuf;

pub(crate) fn http_fetcher(settings: &Settings) -> anyhow::Result<HttpFetcher> {
    Ok(HttpFetcher::new(settings.config.proxy.as_ref())?)
}

/// Cache manager for commands that never download.
pub(crate) fn local_cache_manager(settings: &Settings) -> CacheManager<'static> {
    cache_manager(settings, &Offline)
}

pub(crate) fn cache_manager<'a>(settings: &Settings, fetcher: &'a dyn Fetcher) -> CacheManager<'a> {
    CacheManager::new(
        settings.data_root(),
        settings.config.sources.clone(),
        fetcher,
        &ZipUnpacker,
    )
}

pub(crate) fn artifact_source(channel: Channel, local_file: Option<PathBuf>) -> ArtifactSource {
    match local_file {
        Some(path) => ArtifactSource::LocalFile { channel, path },
        None => ArtifactSource::Remote(channel),
    }
}
