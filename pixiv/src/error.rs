#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("reqwest error")]
    Request(#[from] reqwest::Error),
    #[error("json deserialization failed")]
    Json(#[from] serde_json::Error),
    #[error("api error: {0}")]
    Pixiv(u16, String),
    #[error("no such page: {0}")]
    Absent(String),
    #[error("invalid header value")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("url parse failed")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether the resource genuinely does not exist, as opposed to a
    /// transient failure that is worth retrying.
    pub fn is_absent(&self) -> bool {
        matches!(self, Error::Absent(_) | Error::Pixiv(404, _))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
