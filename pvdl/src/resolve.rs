use crate::retry::RetryPolicy;
use clap::ValueEnum;
use pixiv::reqwest::Url;
use pixiv::{IllustId, WebClient};
use strum_macros::IntoStaticStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    Illust,
    User,
    Tag,
}

/// The metadata endpoint of one illustration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllustRef {
    pub id: IllustId,
    pub url: Url,
}

impl IllustRef {
    pub fn new(client: &WebClient, id: IllustId) -> Self {
        let url = client.endpoint().illust(&id);
        Self { id, url }
    }
}

async fn user_illusts(client: &WebClient, policy: &RetryPolicy, uid: &str) -> Vec<IllustId> {
    let label = format!("<{uid}:user>");
    let ids = policy
        .run(&label, None, || async {
            anyhow::Ok(Some(client.user_illust_ids(uid).await?))
        })
        .await;
    match ids {
        Some(ids) => {
            info!("{label} has {} illusts", ids.len());
            ids
        }
        None => {
            warn!("{label}: could not list illusts");
            vec![]
        }
    }
}

async fn tag_illusts(client: &WebClient, policy: &RetryPolicy, tag: &str) -> Vec<IllustId> {
    let label = format!("<{tag}:tag>");
    let mut r = vec![];
    let mut pages = 1;
    let mut pn = 1;
    while pn <= pages {
        let page = policy
            .run(&format!("{label} page {pn}"), None, || async {
                anyhow::Ok(Some(client.search_artworks(tag, pn).await?))
            })
            .await;
        let Some(page) = page else {
            warn!("{label}: stopped at page {pn} of {pages}");
            break;
        };
        if pn == 1 {
            pages = page.last_page;
            info!("{label} has pages: {pages} ({} reported)", page.total);
        }
        let before = r.len();
        r.extend(page.illust_ids().map(str::to_owned));
        info!("{label}: found {} illusts at page {pn}", r.len() - before);
        pn += 1;
    }
    info!("{label}: {} illusts in total", r.len());
    r
}

/// Turns targets into illustration references, in target order. A target
/// that cannot be resolved contributes nothing.
pub async fn resolve(
    client: &WebClient,
    policy: &RetryPolicy,
    mode: Mode,
    values: &[String],
) -> Vec<IllustRef> {
    let mut ids = vec![];
    for v in values {
        match mode {
            Mode::Illust => ids.push(v.clone()),
            Mode::User => ids.extend(user_illusts(client, policy, v).await),
            Mode::Tag => ids.extend(tag_illusts(client, policy, v).await),
        }
    }
    ids.into_iter().map(|id| IllustRef::new(client, id)).collect()
}
