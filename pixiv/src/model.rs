use serde::{Deserialize, Deserializer};
use serde_aux::field_attributes::deserialize_string_from_number;
use serde_json::Value;
use strum_macros::IntoStaticStr;

pub type IllustId = String;
pub type UserId = String;

/// The `{error, message, body}` wrapper of every ajax response.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub error: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum IllustType {
    Illust,
    Manga,
    Ugoira,
    Unknown(u8),
}

impl From<u8> for IllustType {
    fn from(v: u8) -> Self {
        match v {
            0 => IllustType::Illust,
            1 => IllustType::Manga,
            2 => IllustType::Ugoira,
            n => IllustType::Unknown(n),
        }
    }
}

impl<'de> Deserialize<'de> for IllustType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        u8::deserialize(d).map(Into::into)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ImageUrls {
    pub original: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Illust {
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub illust_id: IllustId,
    #[serde(default)]
    pub illust_title: String,
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub user_id: UserId,
    pub user_name: String,
    pub illust_type: IllustType,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub bookmark_count: u32,
    #[serde(default)]
    pub urls: ImageUrls,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PageUrls {
    pub original: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Page {
    pub urls: PageUrls,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Frame {
    pub file: String,
    pub delay: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UgoiraMeta {
    pub original_src: String,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProfileAll {
    #[serde(default)]
    pub illusts: Value,
}

impl ProfileAll {
    /// Ids keep the order the server sent them in. An account without works
    /// gets `[]` instead of an object.
    pub fn illust_ids(&self) -> Vec<IllustId> {
        match &self.illusts {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Array(a) => a
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchItem {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub data: Vec<SearchItem>,
    pub last_page: u32,
    #[serde(default)]
    pub total: u32,
}

impl SearchPage {
    /// Ad containers carry no id and are skipped.
    pub fn illust_ids(&self) -> impl Iterator<Item = &str> {
        self.data.iter().filter_map(|i| i.id.as_deref())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub illust_manga: SearchPage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn illust_from_ajax_body() {
        let v = json!({
            "illustId": "118147030",
            "illustTitle": "t",
            "userId": 24142381,
            "userName": "a/b",
            "illustType": 2,
            "pageCount": 1,
            "bookmarkCount": 42,
            "urls": { "original": null },
        });
        let i: Illust = serde_json::from_value(v).unwrap();
        assert_eq!(i.illust_id, "118147030");
        assert_eq!(i.user_id, "24142381");
        assert_eq!(i.illust_type, IllustType::Ugoira);
        assert!(i.urls.original.is_none());

        let i: Illust = serde_json::from_value(json!({
            "illustId": "1", "userId": "2", "userName": "u", "illustType": 7,
        }))
        .unwrap();
        assert_eq!(i.illust_type, IllustType::Unknown(7));
    }

    #[test]
    fn profile_ids_keep_order() {
        let p: ProfileAll =
            serde_json::from_str(r#"{"illusts": {"30": null, "4": null, "100": null}}"#).unwrap();
        assert_eq!(p.illust_ids(), ["30", "4", "100"]);
        let p: ProfileAll = serde_json::from_str(r#"{"illusts": []}"#).unwrap();
        assert!(p.illust_ids().is_empty());
    }

    #[test]
    fn search_skips_ads() {
        let r: SearchResult = serde_json::from_value(json!({
            "illustManga": {
                "data": [{"id": "1"}, {"isAdContainer": true}, {"id": "2"}],
                "lastPage": 3,
                "total": 130,
            }
        }))
        .unwrap();
        assert_eq!(r.illust_manga.illust_ids().collect::<Vec<_>>(), ["1", "2"]);
        assert_eq!(r.illust_manga.last_page, 3);
    }
}
