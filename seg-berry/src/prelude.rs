//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Rgb};

pub use crate::data::{
    ColourRemap, CropSpec, CtWindow, LabelPalette, NiftiHeaderAttr, Preprocess, VolumeMeta,
};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{
    self, assign_splits, discover_pairs, FilePair, PairLayout, Split, SplitRatios,
};

pub use crate::adapter::huggingface::index_split;
pub use crate::adapter::{AdapterKind, AdapterKwargs, ManifestSpec, OutputAdapter};

pub use crate::consts::{DEFAULT_SEED, DEFAULT_TRAIN, DEFAULT_VAL, DEFAULT_TEST};

pub use crate::executor::{CancelToken, ParallelExecutor};
pub use crate::pipeline::{run_export, run_export_with, ExportOptions, ExportReport};
