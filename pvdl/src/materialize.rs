use crate::hooks::Transform;
use anyhow::{Context, Result, bail};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame};
use pixiv::model::Frame as FrameMeta;
use std::fs;
use std::io::{BufWriter, Cursor, Read};
use std::path::{Path, PathBuf};

const DEFAULT_DELAY_MS: u32 = 100;

fn saved_name(path: &Path) -> Result<String> {
    Ok(path
        .file_name()
        .and_then(|s| s.to_str())
        .with_context(|| format!("bad destination {path:?}"))?
        .to_owned())
}

fn save_image(data: &[u8], dest: &Path, transform: Option<&Transform>) -> Result<String> {
    match transform {
        Some(t) => {
            let img = image::load_from_memory(data).context("decoding image")?;
            t.apply(img)
                .save(dest)
                .with_context(|| format!("encoding {dest:?}"))?;
        }
        None => fs::write(dest, data).with_context(|| format!("writing {dest:?}"))?,
    }
    info!("downloaded: {dest:?}");
    saved_name(dest)
}

/// Saves one image asset at `dest` and returns the saved filename. Untouched
/// bytes are written as-is; with a transform the image is decoded and
/// re-encoded by the extension of `dest`.
pub async fn materialize(data: Vec<u8>, dest: PathBuf, transform: Option<Transform>) -> Result<String> {
    tokio::task::spawn_blocking(move || save_image(&data, &dest, transform.as_ref())).await?
}

fn decode_frames(
    archive: &[u8],
    frames: &[FrameMeta],
    transform: Option<&Transform>,
) -> Result<Vec<(DynamicImage, u32)>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).context("opening frame archive")?;
    let order: Vec<(String, u32)> = if frames.is_empty() {
        zip.file_names()
            .map(|n| (n.to_owned(), DEFAULT_DELAY_MS))
            .collect()
    } else {
        frames.iter().map(|f| (f.file.clone(), f.delay)).collect()
    };
    debug!("{} frames in archive", order.len());

    let mut buf = Vec::new();
    let mut r = Vec::with_capacity(order.len());
    for (name, delay) in order {
        buf.clear();
        zip.by_name(&name)
            .with_context(|| format!("frame {name} missing"))?
            .read_to_end(&mut buf)?;
        let img = image::load_from_memory(&buf).with_context(|| format!("decoding frame {name}"))?;
        let img = match transform {
            Some(t) => t.apply(img),
            None => img,
        };
        r.push((img, delay));
    }
    Ok(r)
}

fn save_animated(
    archive: &[u8],
    dest: &Path,
    transform: Option<&Transform>,
    frames: &[FrameMeta],
) -> Result<()> {
    let decoded = decode_frames(archive, frames, transform)?;
    if decoded.is_empty() {
        bail!("frame archive is empty");
    }
    let tmp = dest.with_extension("gif.part");
    let write = || -> Result<()> {
        let mut enc = GifEncoder::new(BufWriter::new(fs::File::create(&tmp)?));
        enc.set_repeat(Repeat::Infinite)?;
        enc.encode_frames(decoded.into_iter().map(|(img, delay)| {
            Frame::from_parts(img.into_rgba8(), 0, 0, Delay::from_numer_denom_ms(delay, 1))
        }))?;
        Ok(())
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(e.context(format!("encoding {dest:?}")));
    }
    fs::rename(&tmp, dest)?;
    Ok(())
}

/// Assembles the frames of an animated illustration into a looping GIF named
/// `file_name` under `dest_dir`. Frames are read from the archive in memory,
/// so concurrent calls share no scratch space.
pub async fn materialize_animated(
    archive: Vec<u8>,
    dest_dir: PathBuf,
    transform: Option<Transform>,
    file_name: String,
    frames: Vec<FrameMeta>,
) -> Result<String> {
    let dest = dest_dir.join(&file_name);
    tokio::task::spawn_blocking(move || {
        save_animated(&archive, &dest, transform.as_ref(), &frames)?;
        info!("downloaded: {dest:?}");
        anyhow::Ok(file_name)
    })
    .await?
}
