use std::collections::BTreeMap;
use url::Url;

use super::model::{DownloadResponse, Image};
use crate::content;
use crate::error::ApiError;
use crate::readeck::{Bookmark, BookmarkBackend};

/// Upper bound on result pages walked per site.
pub const MAX_SEARCH_PAGES: u32 = 100;

/// Candidate `site` filters for a host: the host itself, then its
/// second-level label (`www.theatlantic.com` also tries `theatlantic`).
pub fn sites_to_try(host: &str) -> Vec<String> {
    let mut sites = vec![host.to_string()];

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        let site = labels[labels.len() - 2];
        if !site.is_empty() && !sites.iter().any(|s| s == site) {
            sites.push(site.to_string());
        }
    }

    sites
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Scheme, host (minus a leading `www.`) and path must agree. Query and
/// fragment are ignored; unparsable URLs never match.
pub fn compare_urls(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (Url::parse(a), Url::parse(b)) else {
        return false;
    };

    a.scheme() == b.scheme()
        && a.host_str().map(strip_www) == b.host_str().map(strip_www)
        && a.path() == b.path()
}

/// Searches the backend for an active bookmark matching `target`.
pub async fn find_bookmark(backend: &dyn BookmarkBackend, target: &Url) -> Option<Bookmark> {
    let host = target.host_str()?;

    for site in sites_to_try(host) {
        let mut page = 1;
        let mut total_pages = 1;

        while page <= total_pages {
            let result = match backend.search_by_site(&site, page, Some(false)).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(site = %site, page, error = %e, "bookmark search failed, trying next site");
                    break;
                }
            };
            if page == 1 && result.total_pages > MAX_SEARCH_PAGES {
                tracing::warn!(site = %site, total_pages = result.total_pages, "capping bookmark search pages");
            }
            total_pages = result.total_pages.min(MAX_SEARCH_PAGES);

            if let Some(found) = result
                .bookmarks
                .into_iter()
                .find(|bookmark| compare_urls(&bookmark.url, target.as_str()))
            {
                return Some(found);
            }
            page = match page.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
    }

    None
}

pub async fn download(backend: &dyn BookmarkBackend, url: &str) -> Result<DownloadResponse, ApiError> {
    let target = Url::parse(url).map_err(|e| ApiError::BadRequest(format!("invalid url: {}", e)))?;
    if target.host_str().is_none() {
        return Err(ApiError::BadRequest("url has no host".to_string()));
    }

    let bookmark = find_bookmark(backend, &target)
        .await
        .ok_or_else(|| ApiError::NotFound("article not found".to_string()))?;

    let html = backend.fetch_article_html(&bookmark.id).await?;
    let rewritten = content::rewrite_images(&html);
    tracing::info!(
        item_id = %bookmark.id,
        images = rewritten.images.len(),
        "prepared article for download"
    );

    let images: BTreeMap<String, Image> = rewritten
        .images
        .into_iter()
        .map(|image| {
            let key = image.ordinal.to_string();
            (
                key.clone(),
                Image {
                    image_id: key.clone(),
                    item_id: key,
                    src: image.source_url,
                },
            )
        })
        .collect();

    Ok(DownloadResponse {
        article: rewritten.html,
        images,
    })
}
