/*!
Sliding-window patch extraction.

Windows of `patch_size × patch_size` move by `stride` pixels, row-major
(top to bottom, left to right within a row). Only windows that fit entirely
inside the image are produced.
 */
use ndarray::{s, ArrayView3};

use crate::error::{Error, Result};
use crate::input::ImageRecord;

/// A square window of an image. `pixels` is a [patch_size, patch_size, C] view.
#[derive(Debug, Clone)]
pub struct Patch<'a> {
    pub index: usize,
    pub row: usize,
    pub col: usize,
    pub pixels: ArrayView3<'a, f32>,
}

/// Lazy, restartable (`Clone`) sequence of patches over one image.
#[derive(Debug, Clone)]
pub struct Patches<'a> {
    image: ArrayView3<'a, f32>,
    patch_size: usize,
    stride: usize,
    rows: usize,
    cols: usize,
    next: usize,
}

/// Number of window positions along one axis.
pub fn positions(extent: usize, patch_size: usize, stride: usize) -> usize {
    if patch_size > extent {
        0
    } else {
        (extent - patch_size) / stride + 1
    }
}

pub fn generate_patches(image: &ImageRecord, patch_size: usize, stride: usize) -> Result<Patches<'_>> {
    if patch_size == 0 || stride == 0 {
        return Err(Error::Configuration(format!(
            "patch size and stride must be positive (got {} and {})",
            patch_size, stride
        )));
    }
    let (height, width, _) = image.pixels.dim();
    Ok(Patches {
        image: image.pixels.view(),
        patch_size,
        stride,
        rows: positions(height, patch_size, stride),
        cols: positions(width, patch_size, stride),
        next: 0,
    })
}

impl<'a> Iterator for Patches<'a> {
    type Item = Patch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.rows * self.cols {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let row = (index / self.cols) * self.stride;
        let col = (index % self.cols) * self.stride;
        let pixels = self
            .image
            .slice_move(s![row..row + self.patch_size, col..col + self.patch_size, ..]);
        Some(Patch { index, row, col, pixels })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows * self.cols - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Patches<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn image(height: usize, width: usize, channels: usize) -> ImageRecord {
        let pixels = Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
            (y * 100 + x * 10 + c) as f32
        });
        ImageRecord::new("img", pixels, "a")
    }

    #[test]
    fn count_matches_closed_form() {
        for &(h, w, p, s) in &[(8, 8, 4, 4), (10, 7, 3, 2), (5, 9, 5, 1), (16, 16, 4, 3)] {
            let img = image(h, w, 3);
            let patches = generate_patches(&img, p, s).unwrap();
            let expected = ((h - p) / s + 1) * ((w - p) / s + 1);
            assert_eq!(patches.len(), expected);
            assert_eq!(patches.count(), expected);
        }
    }

    #[test]
    fn every_patch_has_the_window_shape() {
        let img = image(10, 7, 3);
        for patch in generate_patches(&img, 3, 2).unwrap() {
            assert_eq!(patch.pixels.dim(), (3, 3, 3));
        }
    }

    #[test]
    fn patches_are_row_major() {
        let img = image(6, 6, 1);
        let origins = generate_patches(&img, 2, 2)
            .unwrap()
            .map(|p| (p.index, p.row, p.col))
            .collect::<Vec<_>>();
        assert_eq!(origins[0], (0, 0, 0));
        assert_eq!(origins[1], (1, 0, 2));
        assert_eq!(origins[3], (3, 2, 0));
        assert_eq!(origins.len(), 9);

        let sixth = generate_patches(&img, 2, 2).unwrap().nth(5).unwrap();
        // origin (2, 4): value = y*100 + x*10
        assert_eq!(sixth.pixels[[0, 0, 0]], 240.0);
        assert_eq!(sixth.pixels[[1, 1, 0]], 350.0);
    }

    #[test]
    fn oversized_window_yields_nothing() {
        let img = image(4, 10, 3);
        assert_eq!(generate_patches(&img, 5, 1).unwrap().count(), 0);
    }

    #[test]
    fn sequence_is_restartable() {
        let img = image(9, 9, 2);
        let patches = generate_patches(&img, 3, 3).unwrap();
        let first = patches.clone().map(|p| p.index).collect::<Vec<_>>();
        let second = patches.map(|p| p.index).collect::<Vec<_>>();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_stride_is_rejected() {
        let img = image(4, 4, 1);
        assert!(matches!(generate_patches(&img, 2, 0), Err(Error::Configuration(_))));
    }
}
