use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use ndarray::Array3;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// A labeled image, immutable once loaded.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: String,
    /// [H, W, C] pixel values
    pub pixels: Array3<f32>,
    pub label: String,
}

impl ImageRecord {
    pub fn new(id: impl Into<String>, pixels: Array3<f32>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pixels,
            label: label.into(),
        }
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn channels(&self) -> usize {
        self.pixels.dim().2
    }
}

/// Anything able to hand over the already loaded images of a run.
pub trait ImageSource {
    fn get_images_and_labels(&self) -> Result<Vec<ImageRecord>>;
}

/**
Images stored as files in one directory, labeled by a JSON object mapping
each file name to its class:

```json
{ "img_001.png": "benign", "img_002.png": "malignant" }
```

The file name is used as the image id. Pixels are converted to RGB and
scaled to [0, 1].
 */
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    labels: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            labels: labels.into(),
        }
    }
}

impl ImageSource for DirectorySource {
    fn get_images_and_labels(&self) -> Result<Vec<ImageRecord>> {
        let file = BufReader::new(File::open(&self.labels)?);
        let labels: BTreeMap<String, String> = serde_json::from_reader(file)?;
        debug!("{} labeled images listed in {:?}", labels.len(), self.labels);

        labels
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(name, label)| -> Result<ImageRecord> {
                let pixels = load_rgb(&self.root.join(&name))?;
                Ok(ImageRecord::new(name, pixels, label))
            })
            .collect()
    }
}

fn load_rgb(path: &Path) -> Result<Array3<f32>> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let data = rgb
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect::<Vec<_>>();
    Array3::from_shape_vec((height as usize, width as usize, 3), data)
        .map_err(|err| Error::Configuration(format!("{:?}: {}", path, err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn directory_source_loads_labeled_rgb_images() {
        let dir = std::env::temp_dir().join(format!("patch-fusion-input-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(6, 4, Rgb([255, 0, 0]))
            .save(dir.join("red.png"))
            .unwrap();
        RgbImage::from_pixel(3, 3, Rgb([0, 0, 255]))
            .save(dir.join("blue.png"))
            .unwrap();
        let labels = dir.join("labels.json");
        std::fs::write(&labels, r#"{"red.png": "warm", "blue.png": "cold"}"#).unwrap();

        let images = DirectorySource::new(&dir, &labels)
            .get_images_and_labels()
            .unwrap();

        assert_eq!(images.len(), 2);
        let red = images.iter().find(|img| img.id == "red.png").unwrap();
        assert_eq!(red.label, "warm");
        assert_eq!((red.height(), red.width(), red.channels()), (4, 6, 3));
        assert_eq!(red.pixels[[0, 0, 0]], 1.0);
        assert_eq!(red.pixels[[3, 5, 2]], 0.0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_image_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("patch-fusion-missing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let labels = dir.join("labels.json");
        std::fs::write(&labels, r#"{"nowhere.png": "a"}"#).unwrap();

        let res = DirectorySource::new(&dir, &labels).get_images_and_labels();
        assert!(res.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
