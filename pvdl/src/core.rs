use crate::config::{Config, ensure_dir};
use crate::hooks::{ConfigFilter, ConfigTransform, Filter, Transform};
use crate::illust::{Downloader, Outcome};
use crate::pool;
use crate::resolve::{Mode, resolve};
use crate::state::DownloadState;
use anyhow::Result;
use pixiv::WebClient;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub downloaded: usize,
    /// Illustrations with at least one asset left pending.
    pub partial: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    fn collect(total: usize, outcomes: &[Option<Outcome>]) -> Self {
        let mut s = Summary {
            total,
            ..Default::default()
        };
        for o in outcomes {
            match o {
                Some(Outcome::Downloaded { failed: 0, .. }) => s.downloaded += 1,
                Some(Outcome::Downloaded { .. }) => s.partial += 1,
                Some(_) => s.skipped += 1,
                None => s.failed += 1,
            }
        }
        // panicked tasks leave no outcome at all
        s.failed += total - outcomes.len();
        s
    }
}

#[derive(Debug)]
pub struct Pvdl {
    pub conf: Config,
    client: Arc<WebClient>,
}

impl Pvdl {
    pub fn new(conf: Config) -> Result<Self> {
        let client = Arc::new(WebClient::new(conf.web.clone())?);
        Ok(Self { conf, client })
    }

    /// Downloads everything `values` resolve to, with the filter and transform
    /// from the config.
    pub async fn download(&self, mode: Mode, values: &[String]) -> Result<Summary> {
        let filter = ConfigFilter::build(&self.conf.filter);
        let transform = ConfigTransform::build(&self.conf.transform);
        self.download_with(mode, values, filter, transform).await
    }

    /// A failed illustration never aborts the run; errors are only returned
    /// for setup failures and for a manifest that could not be written.
    pub async fn download_with(
        &self,
        mode: Mode,
        values: &[String],
        filter: Option<Filter>,
        transform: Option<Transform>,
    ) -> Result<Summary> {
        let t = Instant::now();
        let mode_name: &'static str = mode.into();
        info!("begin downloading <{values:?}:{mode_name}>");

        ensure_dir(&self.conf.root)?;
        let download_dir = self.conf.download_dir();
        ensure_dir(&download_dir)?;
        info!("download directory is {download_dir:?}");

        let state = Arc::new(DownloadState::load(&download_dir)?);
        let targets = resolve(&self.client, &self.conf.retry, mode, values).await;
        let total = targets.len();
        info!("{total} illusts to check");

        let dl = Arc::new(Downloader {
            client: self.client.clone(),
            state: state.clone(),
            download_dir,
            policy: self.conf.retry,
            workers: self.conf.workers,
            filter,
            transform,
        });
        let tasks = targets.into_iter().map(|target| {
            let dl = dl.clone();
            async move {
                let label = format!("illust '{}'", target.id);
                dl.policy
                    .run(&label, None, || async { anyhow::Ok(Some(dl.download(&target).await?)) })
                    .await
            }
        });
        let outcomes = pool::run_all("illusts", self.conf.workers, tasks).await;

        state.persist()?;
        let summary = Summary::collect(total, &outcomes);
        info!(
            "finish downloading <{values:?}:{mode_name}> in {:.1} secs: {summary:?}",
            t.elapsed().as_secs_f32()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::tests::{frame_zip, png};
    use crate::retry::{Limit, RetryPolicy};
    use crate::state::MANIFEST_FILE;
    use pixiv::WebConfig;
    use pixiv::model::Illust;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok(body: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"error": false, "message": "", "body": body}))
    }

    fn absent() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"error": true, "message": "no such page", "body": []}))
    }

    fn illust(server: &MockServer, id: &str, user: &str, ty: u8) -> Value {
        json!({
            "illustId": id, "userId": "1", "userName": user, "illustType": ty,
            "urls": { "original": format!("{}/img/{id}_p0.png", server.uri()) },
        })
    }

    fn pvdl(server: &MockServer, root: &Path) -> Pvdl {
        Pvdl::new(Config {
            web: WebConfig {
                host: Some(server.uri()),
                ..Default::default()
            },
            root: root.to_owned(),
            retry: RetryPolicy::new(Limit::Attempts(2)),
            ..Default::default()
        })
        .unwrap()
    }

    async fn mount(server: &MockServer, p: &str, resp: ResponseTemplate, times: Option<u64>) {
        let m = Mock::given(path(p)).respond_with(resp);
        match times {
            Some(n) => m.expect(n).mount(server).await,
            None => m.mount(server).await,
        }
    }

    fn manifest(root: &Path) -> Value {
        let s = fs::read_to_string(root.join("download").join(MANIFEST_FILE)).unwrap();
        serde_json::from_str(&s).unwrap()
    }

    #[tokio::test]
    async fn complete_illust_fetches_only_metadata() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("download")).unwrap();
        fs::write(
            root.path().join("download").join(MANIFEST_FILE),
            r#"{"u": {"1": ["1_p0.png"]}}"#,
        )
        .unwrap();
        mount(&server, "/ajax/illust/1", ok(illust(&server, "1", "u", 0)), Some(1)).await;
        mount(&server, "/ajax/illust/1/pages", absent(), Some(0)).await;
        mount(&server, "/img/1_p0.png", ResponseTemplate::new(200), Some(0)).await;

        let s = pvdl(&server, root.path())
            .download(Mode::Illust, &["1".into()])
            .await
            .unwrap();
        assert_eq!(s.skipped, 1);
        assert_eq!(manifest(root.path()), json!({"u": {"1": ["1_p0.png"]}}));
    }

    #[tokio::test]
    async fn failed_page_is_resumed_next_run() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        let img = |n: u32| format!("{}/img/2_p{n}.png", server.uri());
        let pages = json!([
            {"urls": {"original": img(0)}},
            {"urls": {"original": img(1)}},
            {"urls": {"original": img(2)}},
        ]);
        mount(&server, "/ajax/illust/2", ok(illust(&server, "2", "a/b", 1)), None).await;
        mount(&server, "/ajax/illust/2/pages", ok(pages.clone()), None).await;
        mount(&server, "/img/2_p0.png", ResponseTemplate::new(200).set_body_bytes(png(2, 2, [0; 4])), Some(1)).await;
        mount(&server, "/img/2_p1.png", ResponseTemplate::new(503), Some(2)).await;
        mount(&server, "/img/2_p2.png", ResponseTemplate::new(200).set_body_bytes(b"p2".to_vec()), Some(1)).await;

        let s = pvdl(&server, root.path())
            .download(Mode::Illust, &["2".into()])
            .await
            .unwrap();
        assert_eq!(s.partial, 1);
        assert_eq!(manifest(root.path())["a/b"]["2"], json!(["2_p0.png", "", "2_p2.png"]));
        let author = root.path().join("download").join("a_b");
        assert_eq!(fs::read(author.join("2_p2.png")).unwrap(), b"p2");
        assert!(!author.join("2_p1.png").exists());
        server.verify().await;
        server.reset().await;

        mount(&server, "/ajax/illust/2", ok(illust(&server, "2", "a/b", 1)), None).await;
        mount(&server, "/ajax/illust/2/pages", ok(pages), None).await;
        mount(&server, "/img/2_p0.png", ResponseTemplate::new(200), Some(0)).await;
        mount(&server, "/img/2_p1.png", ResponseTemplate::new(200).set_body_bytes(b"p1".to_vec()), Some(1)).await;
        mount(&server, "/img/2_p2.png", ResponseTemplate::new(200), Some(0)).await;

        let s = pvdl(&server, root.path())
            .download(Mode::Illust, &["2".into()])
            .await
            .unwrap();
        assert_eq!(s.downloaded, 1);
        assert_eq!(
            manifest(root.path())["a/b"]["2"],
            json!(["2_p0.png", "2_p1.png", "2_p2.png"])
        );
    }

    #[tokio::test]
    async fn single_image_falls_back_to_original_url() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount(&server, "/ajax/illust/4", ok(illust(&server, "4", "u", 0)), Some(1)).await;
        mount(&server, "/ajax/illust/4/pages", absent(), Some(1)).await;
        mount(&server, "/img/4_p0.png", ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()), Some(1)).await;

        let s = pvdl(&server, root.path())
            .download(Mode::Illust, &["4".into()])
            .await
            .unwrap();
        assert_eq!(s.downloaded, 1);
        assert_eq!(manifest(root.path())["u"]["4"], json!(["4_p0.png"]));
    }

    #[tokio::test]
    async fn ugoira_becomes_gif() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount(&server, "/ajax/illust/3", ok(illust(&server, "3", "u", 2)), Some(1)).await;
        let meta = json!({
            "originalSrc": format!("{}/ugoira/3.zip", server.uri()),
            "frames": [{"file": "000000.png", "delay": 80}, {"file": "000001.png", "delay": 120}],
        });
        mount(&server, "/ajax/illust/3/ugoira_meta", ok(meta), Some(1)).await;
        let zip = frame_zip(&["000000.png", "000001.png"]);
        mount(&server, "/ugoira/3.zip", ResponseTemplate::new(200).set_body_bytes(zip), Some(1)).await;

        let s = pvdl(&server, root.path())
            .download(Mode::Illust, &["3".into()])
            .await
            .unwrap();
        assert_eq!(s.downloaded, 1);
        assert_eq!(manifest(root.path())["u"]["3"], json!(["3.gif"]));
        let gif = fs::read(root.path().join("download").join("u").join("3.gif")).unwrap();
        assert!(gif.starts_with(b"GIF89a"));
    }

    #[tokio::test]
    async fn bad_illusts_do_not_stop_the_batch() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount(&server, "/ajax/illust/7", ok(illust(&server, "7", "u", 9)), Some(1)).await;
        mount(&server, "/ajax/illust/8", ResponseTemplate::new(500), Some(2)).await;
        mount(&server, "/ajax/illust/9", ok(illust(&server, "9", "u", 0)), Some(1)).await;
        mount(&server, "/ajax/illust/9/pages", absent(), None).await;
        mount(&server, "/img/9_p0.png", ResponseTemplate::new(200).set_body_bytes(b"9".to_vec()), Some(1)).await;

        let s = pvdl(&server, root.path())
            .download(Mode::Illust, &["7".into(), "8".into(), "9".into()])
            .await
            .unwrap();
        assert_eq!(
            s,
            Summary {
                total: 3,
                downloaded: 1,
                partial: 0,
                skipped: 1,
                failed: 1,
            }
        );
        assert_eq!(manifest(root.path()), json!({"u": {"9": ["9_p0.png"]}}));
    }

    #[tokio::test]
    async fn filter_skips_without_asset_requests() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount(&server, "/ajax/illust/5", ok(illust(&server, "5", "blocked", 0)), Some(1)).await;
        mount(&server, "/ajax/illust/5/pages", absent(), Some(0)).await;
        mount(&server, "/img/5_p0.png", ResponseTemplate::new(200), Some(0)).await;

        let filter: Filter = Arc::new(|i: &Illust| i.user_name != "blocked");
        let s = pvdl(&server, root.path())
            .download_with(Mode::Illust, &["5".into()], Some(filter), None)
            .await
            .unwrap();
        assert_eq!(s.skipped, 1);
        assert!(!root.path().join("download").join("blocked").exists());
    }

    #[tokio::test]
    async fn user_mode_downloads_every_listed_illust() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount(&server, "/ajax/user/10/profile/all", ok(json!({"illusts": {"21": null, "22": null}})), Some(1)).await;
        for id in ["21", "22"] {
            mount(&server, &format!("/ajax/illust/{id}"), ok(illust(&server, id, "u", 0)), Some(1)).await;
            mount(&server, &format!("/ajax/illust/{id}/pages"), absent(), None).await;
            mount(
                &server,
                &format!("/img/{id}_p0.png"),
                ResponseTemplate::new(200).set_body_bytes(id.as_bytes().to_vec()),
                Some(1),
            )
            .await;
        }

        let s = pvdl(&server, root.path())
            .download(Mode::User, &["10".into()])
            .await
            .unwrap();
        assert_eq!(s.total, 2);
        assert_eq!(s.downloaded, 2);
        assert_eq!(
            manifest(root.path()),
            json!({"u": {"21": ["21_p0.png"], "22": ["22_p0.png"]}})
        );
    }
}
