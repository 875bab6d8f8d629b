use crate::hooks::{Filter, Transform};
use crate::materialize::{materialize, materialize_animated};
use crate::pool;
use crate::resolve::IllustRef;
use crate::retry::{Limit, RetryPolicy};
use crate::state::{Claim, DownloadState, PendingAsset, SlotFill, file_name};
use anyhow::{Context, Result};
use itertools::Itertools;
use pixiv::WebClient;
use pixiv::model::{Illust, IllustType};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Downloaded { saved: usize, failed: usize },
    Complete,
    Busy,
    Filtered,
    Unsupported,
    Unavailable,
}

pub fn sanitize_author(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

#[derive(Debug)]
pub struct Downloader {
    pub(crate) client: Arc<WebClient>,
    pub(crate) state: Arc<DownloadState>,
    pub(crate) download_dir: PathBuf,
    pub(crate) policy: RetryPolicy,
    pub(crate) workers: usize,
    pub(crate) filter: Option<Filter>,
    pub(crate) transform: Option<Transform>,
}

impl Downloader {
    async fn author_dir(&self, author: &str) -> Result<PathBuf> {
        let dir = self.download_dir.join(sanitize_author(author));
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {dir:?}"))?;
        Ok(dir)
    }

    /// Downloads whatever is still missing of one illustration. Errors are
    /// left to the caller's retry policy.
    pub async fn download(self: &Arc<Self>, target: &IllustRef) -> Result<Outcome> {
        let meta: Illust = self
            .client
            .call(target.url.clone())
            .await
            .with_context(|| format!("fetching {}", target.url))?;
        let (author, id) = (meta.user_name.as_str(), meta.illust_id.as_str());

        let _claim = match self.state.claim(author, id) {
            Claim::Complete => {
                info!("all of '{id}' were downloaded");
                return Ok(Outcome::Complete);
            }
            Claim::Busy => {
                info!("'{id}' is being downloaded by another worker");
                return Ok(Outcome::Busy);
            }
            Claim::Acquired(g) => g,
        };

        if let Some(f) = &self.filter
            && !f.keep(&meta)
        {
            info!("'{id}' by {author} filtered out");
            return Ok(Outcome::Filtered);
        }

        match meta.illust_type {
            IllustType::Illust | IllustType::Manga => self.save_pages(&meta).await,
            IllustType::Ugoira => self.save_ugoira(&meta).await,
            IllustType::Unknown(t) => {
                error!("UNSUPPORTED: skipping unknown type {t} of illust '{id}'");
                Ok(Outcome::Unsupported)
            }
        }
    }

    async fn page_urls(&self, meta: &Illust) -> Option<Vec<String>> {
        let id = &meta.illust_id;
        // Simple illusts have no page list; that is not an error.
        let pages = self
            .policy
            .with_limit(Limit::Unbounded)
            .run(&format!("'{id}' pages"), None, || async {
                anyhow::Ok(Some(self.client.illust_pages(id).await?))
            })
            .await
            .filter(|p| !p.is_empty());
        match pages {
            Some(pages) => Some(pages.into_iter().map(|p| p.urls.original).collect_vec()),
            None => {
                info!("illust '{id}' has no page urls");
                meta.urls.original.clone().map(|u| vec![u])
            }
        }
    }

    async fn save_pages(self: &Arc<Self>, meta: &Illust) -> Result<Outcome> {
        let (author, id) = (meta.user_name.as_str(), meta.illust_id.as_str());
        let Some(urls) = self.page_urls(meta).await else {
            warn!("'{id}' has no original url, skipped");
            return Ok(Outcome::Unavailable);
        };
        let pending = self.state.pending_subset(author, id, &urls);
        info!("'{id}': {} of {} pages to download", pending.len(), urls.len());
        let dir = self.author_dir(author).await?;

        let tasks = pending.into_iter().map(|p| {
            let this = self.clone();
            let dir = dir.clone();
            async move { this.save_page(p, dir).await }
        });
        let fills = pool::run_all(&format!("'{id}'"), self.workers, tasks).await;
        let saved = fills.iter().filter(|f| f.file.is_some()).count();
        let failed = fills.len() - saved;
        self.state.record_completed(author, id, urls.len(), fills);
        Ok(Outcome::Downloaded { saved, failed })
    }

    async fn save_page(&self, p: PendingAsset, dir: PathBuf) -> SlotFill {
        let dest = dir.join(file_name(&p.url));
        let file = self
            .policy
            .run(&p.url, None, || async {
                let data = self.client.bytes(&p.url).await?;
                let name = materialize(data, dest.clone(), self.transform.clone()).await?;
                anyhow::Ok(Some(name))
            })
            .await;
        SlotFill { slot: p.slot, file }
    }

    async fn save_ugoira(&self, meta: &Illust) -> Result<Outcome> {
        let (author, id) = (meta.user_name.as_str(), meta.illust_id.as_str());
        let ugoira = self
            .client
            .ugoira_meta(id)
            .await
            .with_context(|| format!("fetching ugoira meta of '{id}'"))?;
        let dir = self.author_dir(author).await?;
        let name = format!("{id}.gif");
        let src = &ugoira.original_src;
        let file = self
            .policy
            .run(src, None, || async {
                let data = self.client.bytes(src).await?;
                let saved = materialize_animated(
                    data,
                    dir.clone(),
                    self.transform.clone(),
                    name.clone(),
                    ugoira.frames.clone(),
                )
                .await?;
                anyhow::Ok(Some(saved))
            })
            .await;
        let saved = usize::from(file.is_some());
        self.state
            .record_completed(author, id, 1, vec![SlotFill { slot: 0, file }]);
        Ok(Outcome::Downloaded {
            saved,
            failed: 1 - saved,
        })
    }
}
