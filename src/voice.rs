//! Voice style loading and batching.

use crate::error::{Result, TtsError};
use ndarray::{concatenate, s, Array3, Axis};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// On-disk style document: two named tensors of shape `[1, d1, d2]`.
#[derive(Debug, Deserialize)]
struct StyleFile {
    style_ttl: StyleComponent,
    style_dp: StyleComponent,
}

#[derive(Debug, Deserialize)]
struct StyleComponent {
    data: Vec<Vec<Vec<f32>>>,
    dims: Vec<usize>,
}

impl StyleComponent {
    /// Flatten the nested data into a `[1, d1, d2]` array.
    fn into_array(self, name: &str, path: &Path) -> Result<Array3<f32>> {
        let (d1, d2) = match self.dims.as_slice() {
            [1, d1, d2] => (*d1, *d2),
            dims => {
                return Err(TtsError::load(format!(
                    "{name} in {path:?}: expected dims [1, d1, d2], got {dims:?}"
                )))
            }
        };

        let flat: Vec<f32> = self.data.into_iter().flatten().flatten().collect();
        Array3::from_shape_vec((1, d1, d2), flat).map_err(|e| {
            TtsError::load(format!("{name} in {path:?}: data does not match dims: {e}"))
        })
    }
}

/// Batched style conditioning.
///
/// `ttl` conditions the text encoder and vector estimator, `dp` the duration
/// predictor. Both share the batch dimension, one row per text item.
#[derive(Clone, Debug)]
pub struct VoiceStyle {
    ttl: Array3<f32>,
    dp: Array3<f32>,
}

impl VoiceStyle {
    /// Load one style file per path and stack them in path order.
    ///
    /// Every file must declare the same per-item shape as the first.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            return Err(TtsError::invalid_input("at least one voice style is required"));
        }

        let mut ttl_items: Vec<Array3<f32>> = Vec::with_capacity(paths.len());
        let mut dp_items: Vec<Array3<f32>> = Vec::with_capacity(paths.len());
        for path in paths {
            let (ttl, dp) = load_style_file(path.as_ref())?;
            if let (Some(first_ttl), Some(first_dp)) = (ttl_items.first(), dp_items.first()) {
                if first_ttl.shape() != ttl.shape() || first_dp.shape() != dp.shape() {
                    return Err(TtsError::load(format!(
                        "voice style {:?} has a different shape than {:?}",
                        path.as_ref(),
                        paths[0].as_ref()
                    )));
                }
            }
            ttl_items.push(ttl);
            dp_items.push(dp);
        }

        let style = Self::from_arrays(stack(&ttl_items)?, stack(&dp_items)?)?;
        debug!(
            batch = style.batch_size(),
            ttl = ?style.ttl.shape(),
            dp = ?style.dp.shape(),
            "Loaded voice styles"
        );
        Ok(style)
    }

    /// Build a style from already batched tensors.
    pub fn from_arrays(ttl: Array3<f32>, dp: Array3<f32>) -> Result<Self> {
        if ttl.shape()[0] != dp.shape()[0] {
            return Err(TtsError::invalid_input(format!(
                "style_ttl batch ({}) does not match style_dp batch ({})",
                ttl.shape()[0],
                dp.shape()[0]
            )));
        }
        if ttl.shape()[0] == 0 {
            return Err(TtsError::invalid_input("voice style batch is empty"));
        }
        Ok(Self { ttl, dp })
    }

    pub fn batch_size(&self) -> usize {
        self.ttl.shape()[0]
    }

    pub fn ttl(&self) -> &Array3<f32> {
        &self.ttl
    }

    pub fn dp(&self) -> &Array3<f32> {
        &self.dp
    }

    /// Extract batch item `index` as a style of batch size one.
    pub fn select(&self, index: usize) -> Result<Self> {
        if index >= self.batch_size() {
            return Err(TtsError::invalid_input(format!(
                "voice index {} out of range (batch size {})",
                index,
                self.batch_size()
            )));
        }
        Ok(Self {
            ttl: self.ttl.slice(s![index..index + 1, .., ..]).to_owned(),
            dp: self.dp.slice(s![index..index + 1, .., ..]).to_owned(),
        })
    }
}

fn load_style_file(path: &Path) -> Result<(Array3<f32>, Array3<f32>)> {
    let file = File::open(path)
        .map_err(|e| TtsError::load(format!("voice style {path:?}: {e}")))?;
    let parsed: StyleFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| TtsError::load(format!("voice style {path:?}: {e}")))?;

    let ttl = parsed.style_ttl.into_array("style_ttl", path)?;
    let dp = parsed.style_dp.into_array("style_dp", path)?;
    Ok((ttl, dp))
}

fn stack(items: &[Array3<f32>]) -> Result<Array3<f32>> {
    let views: Vec<_> = items.iter().map(|item| item.view()).collect();
    concatenate(Axis(0), &views)
        .map_err(|e| TtsError::load(format!("failed to batch voice styles: {e}")))
}
