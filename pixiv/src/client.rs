use crate::endpoint::WebEndpoint;
use crate::error::{Error, Result};
use crate::model::{Envelope, Illust, IllustId, Page, ProfileAll, SearchPage, SearchResult, UgoiraMeta};
use log::{debug, error};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/97.0.4692.71 Safari/537.36";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: Option<String>,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub asset_timeout: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: None,
            cookie: None,
            user_agent: None,
            proxy: None,
            timeout: Duration::from_secs(5),
            asset_timeout: Duration::from_secs(10),
        }
    }
}

/// Plain GETs against the web frontend with a fixed header set. No retries
/// happen here.
#[derive(Debug)]
pub struct WebClient {
    client: Client,
    api: WebEndpoint,
    timeout: Duration,
    asset_timeout: Duration,
}

impl WebClient {
    pub fn new(conf: WebConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://www.pixiv.net/"),
        );
        if let Some(cookie) = &conf.cookie {
            let mut v = HeaderValue::from_str(cookie)?;
            v.set_sensitive(true);
            headers.insert(header::COOKIE, v);
        }
        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(conf.user_agent.as_deref().unwrap_or(USER_AGENT));
        if let Some(proxy) = &conf.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
            api: WebEndpoint::with_host(conf.host.as_deref())?,
            timeout: conf.timeout,
            asset_timeout: conf.asset_timeout,
        })
    }

    pub fn endpoint(&self) -> &WebEndpoint {
        &self.api
    }

    pub async fn get(&self, url: Url, timeout: Duration) -> Result<Response> {
        let r = self.client.get(url).timeout(timeout).send().await?;
        let st = r.status();
        if st.is_success() || st.is_redirection() {
            debug!("{} from {}", st, r.url());
            Ok(r)
        } else {
            if st == reqwest::StatusCode::NOT_FOUND {
                debug!("{} from {}", st, r.url());
            } else {
                error!("{} from {}", st, r.url());
            }
            Err(Error::Pixiv(st.as_u16(), r.text().await?))
        }
    }

    /// Fetches a whole asset body.
    pub async fn bytes(&self, url: &str) -> Result<Vec<u8>> {
        let r = self.get(Url::parse(url)?, self.asset_timeout).await?;
        Ok(r.bytes().await?.to_vec())
    }

    /// Fetches an ajax envelope and decodes its body. `error: true` means the
    /// resource is absent.
    pub async fn call<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let r: Envelope = self.get(url, self.timeout).await?.json().await?;
        if r.error {
            return Err(Error::Absent(r.message));
        }
        Ok(serde_json::from_value(r.body)?)
    }

    pub async fn illust(&self, id: &str) -> Result<Illust> {
        self.call(self.api.illust(id)).await
    }

    pub async fn illust_pages(&self, id: &str) -> Result<Vec<Page>> {
        self.call(self.api.illust_pages(id)).await
    }

    pub async fn ugoira_meta(&self, id: &str) -> Result<UgoiraMeta> {
        self.call(self.api.ugoira_meta(id)).await
    }

    pub async fn user_illust_ids(&self, uid: &str) -> Result<Vec<IllustId>> {
        let r: ProfileAll = self.call(self.api.user_profile_all(uid)).await?;
        Ok(r.illust_ids())
    }

    pub async fn search_artworks(&self, tag: &str, page: u32) -> Result<SearchPage> {
        let r: SearchResult = self.call(self.api.search_artworks(tag, page)).await?;
        Ok(r.illust_manga)
    }
}
