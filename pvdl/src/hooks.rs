use image::DynamicImage;
use pixiv::model::Illust;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Decides from an illustration's metadata whether to download it.
pub trait IllustFilter: Send + Sync {
    fn keep(&self, illust: &Illust) -> bool;
}

/// Rewrites decoded image data before it is saved.
pub trait ImageTransform: Send + Sync {
    fn apply(&self, img: DynamicImage) -> DynamicImage;
}

pub type Filter = Arc<dyn IllustFilter>;
pub type Transform = Arc<dyn ImageTransform>;

impl fmt::Debug for dyn IllustFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IllustFilter")
    }
}

impl fmt::Debug for dyn ImageTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImageTransform")
    }
}

impl<F: Fn(&Illust) -> bool + Send + Sync> IllustFilter for F {
    fn keep(&self, illust: &Illust) -> bool {
        self(illust)
    }
}

impl<F: Fn(DynamicImage) -> DynamicImage + Send + Sync> ImageTransform for F {
    fn apply(&self, img: DynamicImage) -> DynamicImage {
        self(img)
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct FilterConfig {
    #[serde(default)]
    pub exclude_users: Vec<String>,
    pub min_bookmarks: Option<u32>,
    /// Stop accepting after this many illustrations.
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct ConfigFilter {
    exclude_users: HashSet<String>,
    min_bookmarks: u32,
    remaining: Option<AtomicUsize>,
}

impl ConfigFilter {
    pub fn build(conf: &FilterConfig) -> Option<Filter> {
        if conf.exclude_users.is_empty() && conf.min_bookmarks.is_none() && conf.limit.is_none() {
            return None;
        }
        Some(Arc::new(Self {
            exclude_users: conf.exclude_users.iter().cloned().collect(),
            min_bookmarks: conf.min_bookmarks.unwrap_or(0),
            remaining: conf.limit.map(AtomicUsize::new),
        }))
    }
}

impl IllustFilter for ConfigFilter {
    fn keep(&self, illust: &Illust) -> bool {
        if self.exclude_users.contains(&illust.user_name)
            || self.exclude_users.contains(&illust.user_id)
            || illust.bookmark_count < self.min_bookmarks
        {
            return false;
        }
        match &self.remaining {
            Some(n) => n
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
            None => true,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct TransformConfig {
    pub max_side: Option<u32>,
    #[serde(default)]
    pub grayscale: bool,
}

#[derive(Debug)]
pub struct ConfigTransform {
    max_side: Option<u32>,
    grayscale: bool,
}

impl ConfigTransform {
    pub fn build(conf: &TransformConfig) -> Option<Transform> {
        let max_side = conf.max_side.filter(|&s| s > 0);
        if max_side.is_none() && !conf.grayscale {
            return None;
        }
        Some(Arc::new(Self {
            max_side,
            grayscale: conf.grayscale,
        }))
    }
}

impl ImageTransform for ConfigTransform {
    fn apply(&self, mut img: DynamicImage) -> DynamicImage {
        if let Some(side) = self.max_side
            && (img.width() > side || img.height() > side)
        {
            img = img.resize(side, side, image::imageops::FilterType::Lanczos3);
        }
        if self.grayscale {
            img = img.grayscale();
        }
        img
    }
}
