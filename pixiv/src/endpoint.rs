use url::Url;

type Result<T> = std::result::Result<T, url::ParseError>;

#[derive(Debug)]
struct Version {
    prefix: Url,
}

impl Version {
    fn new(prefix: &str) -> Result<Self> {
        Ok(Self {
            prefix: Url::parse(prefix)?,
        })
    }

    fn get<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.prefix.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// The ajax endpoints consumed from the web frontend.
#[derive(Debug)]
pub struct WebEndpoint {
    ajax: Version,
}

impl WebEndpoint {
    pub fn with_host(host: Option<&str>) -> Result<Self> {
        let host = host.unwrap_or("https://www.pixiv.net");
        let host = host.trim_end_matches('/');
        Ok(Self {
            ajax: Version::new(&format!("{host}/ajax"))?,
        })
    }

    pub fn new() -> Self {
        Self::with_host(None).expect("default host is a valid url")
    }

    pub fn illust(&self, id: &str) -> Url {
        self.ajax.get(["illust", id])
    }

    pub fn illust_pages(&self, id: &str) -> Url {
        self.ajax.get(["illust", id, "pages"])
    }

    pub fn ugoira_meta(&self, id: &str) -> Url {
        self.ajax.get(["illust", id, "ugoira_meta"])
    }

    pub fn user_profile_all(&self, uid: &str) -> Url {
        self.ajax.get(["user", uid, "profile", "all"])
    }

    /// The tag is percent-encoded as a single path segment.
    pub fn search_artworks(&self, tag: &str, page: u32) -> Url {
        let mut url = self.ajax.get(["search", "artworks", tag]);
        url.query_pairs_mut().append_pair("p", &page.to_string());
        url
    }
}

impl Default for WebEndpoint {
    fn default() -> Self {
        Self::new()
    }
}
