//! Huggingface 图像分割目录布局.
//!
//! ```text
//! <out>/images/<split>/<key>_<i>.jpg
//! <out>/labels/<split>/<key>_<i>.png
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{
    create_split_tree, frame_file_name, save_frame, split_dirs, AdapterKind, AdapterKwargs,
    FrameMode, OutputAdapter, PendingFiles, WriteSummary,
};
use crate::consts::suffix;
use crate::dataset::{ProcessedPair, Split};
use crate::error::JobError;
use crate::executor::Deadline;

/// Huggingface 布局适配器. 扫描帧存为 JPEG, 标签帧原样存为 PNG.
#[derive(Copy, Clone, Debug, Default)]
pub struct HuggingfaceAdapter;

impl OutputAdapter for HuggingfaceAdapter {
    #[inline]
    fn kind(&self) -> AdapterKind {
        AdapterKind::Huggingface
    }

    #[inline]
    fn frame_mode(&self) -> FrameMode {
        FrameMode::PerFrame
    }

    fn prepare(&self, output_dir: &Path) -> io::Result<()> {
        create_split_tree(output_dir)
    }

    fn write(
        &self,
        pair: &ProcessedPair,
        _kwargs: &AdapterKwargs,
        output_dir: &Path,
        deadline: &Deadline,
    ) -> Result<WriteSummary, JobError> {
        let (image_dir, label_dir) = split_dirs(output_dir, self.folding().apply(pair.split));
        let mut pending = PendingFiles::default();
        for (i, (scan, label)) in pair.frames.iter().enumerate() {
            let image_path = image_dir.join(frame_file_name(&pair.key, i, suffix::IMAGE));
            save_frame(scan, pending.track(image_path), ImageFormat::Jpeg)?;
            let label_path = label_dir.join(frame_file_name(&pair.key, i, suffix::LABEL_IMAGE));
            save_frame(label, pending.track(label_path), ImageFormat::Png)?;
            deadline.check()?;
        }
        Ok(WriteSummary {
            frames: pair.frames.len(),
            files: pending.commit(),
        })
    }
}

/// 读回已导出目录中某个划分的 (图像, 标签) 路径对.
///
/// 只保留两侧都存在的帧. 先用 `seed` 打乱, 保留前 `floor(len * fraction)` 个,
/// 最后按路径排序返回. `fraction` 会被截断到 \[0, 1\].
pub fn index_split<P: AsRef<Path>>(
    dataset_dir: P,
    split: Split,
    fraction: f64,
    seed: u64,
) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let (image_dir, label_dir) = split_dirs(dataset_dir.as_ref(), split);
    let image_ext = format!(".{}", suffix::IMAGE);

    let mut pairs = Vec::new();
    for entry in fs::read_dir(&image_dir)? {
        let path = entry?.path();
        let Some(stem) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(image_ext.as_str()))
        else {
            continue;
        };
        let label = label_dir.join(format!("{stem}.{}", suffix::LABEL_IMAGE));
        if label.is_file() {
            pairs.push((path, label));
        } else {
            log::warn!("{} 缺少对应的标签", path.display());
        }
    }
    pairs.sort_unstable();

    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    let keep = (pairs.len() as f64 * fraction).floor() as usize;
    pairs.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    pairs.truncate(keep);
    pairs.sort_unstable();
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn write_pair(dir: &Path, split: Split, key: &str, frames: usize) -> WriteSummary {
        let pair = ProcessedPair {
            key: key.into(),
            split,
            frames: vec![(RgbImage::new(4, 3), RgbImage::new(4, 3)); frames],
            meta: Default::default(),
            dropped: 0,
        };
        HuggingfaceAdapter
            .write(&pair, &AdapterKwargs::default(), dir, &Deadline::unlimited())
            .unwrap()
    }

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        HuggingfaceAdapter.prepare(dir.path()).unwrap();
        for s in ["images/train", "images/val", "images/test", "labels/test"] {
            assert!(dir.path().join(s).is_dir());
        }

        let s = write_pair(dir.path(), Split::Test, "p", 2);
        assert_eq!(s.frames, 2);
        assert_eq!(
            s.files,
            vec![
                dir.path().join("images/test/p_0.jpg"),
                dir.path().join("labels/test/p_0.png"),
                dir.path().join("images/test/p_1.jpg"),
                dir.path().join("labels/test/p_1.png"),
            ]
        );
        let label = image::open(dir.path().join("labels/test/p_1.png")).unwrap();
        assert_eq!((label.width(), label.height()), (4, 3));

        let empty = write_pair(dir.path(), Split::Train, "q", 0);
        assert_eq!(empty, WriteSummary::default());
    }

    #[test]
    fn test_failed_write_leaves_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        HuggingfaceAdapter.prepare(dir.path()).unwrap();
        fs::remove_dir_all(dir.path().join("labels/train")).unwrap();

        let pair = ProcessedPair {
            key: "k".into(),
            split: Split::Train,
            frames: vec![(RgbImage::new(4, 3), RgbImage::new(4, 3)); 2],
            meta: Default::default(),
            dropped: 0,
        };
        let r = HuggingfaceAdapter.write(
            &pair,
            &AdapterKwargs::default(),
            dir.path(),
            &Deadline::unlimited(),
        );
        assert!(matches!(r, Err(JobError::Write(_))));
        assert_eq!(fs::read_dir(dir.path().join("images/train")).unwrap().count(), 0);
    }

    #[test]
    fn test_index_split() {
        let dir = tempfile::tempdir().unwrap();
        HuggingfaceAdapter.prepare(dir.path()).unwrap();
        write_pair(dir.path(), Split::Train, "a", 3);
        write_pair(dir.path(), Split::Train, "b", 1);
        fs::remove_file(dir.path().join("labels/train/a_2.png")).unwrap();

        let all = index_split(dir.path(), Split::Train, 1.0, 0).unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|(i, _)| i.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a_0.jpg", "a_1.jpg", "b_0.jpg"]);
        assert!(all.iter().all(|(_, l)| l.extension().unwrap() == "png"));

        let half = index_split(dir.path(), Split::Train, 0.5, 9).unwrap();
        assert_eq!(half.len(), 1);
        assert_eq!(half, index_split(dir.path(), Split::Train, 0.5, 9).unwrap());
        assert!(index_split(dir.path(), Split::Val, 1.0, 0).unwrap().is_empty());
    }
}
