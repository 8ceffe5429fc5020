//! Rasterization of ROI contours onto the pixel grid of their series.

use crate::error::Diagnostic;
use crate::geometry::SeriesGeometry;
use crate::model::{Polygon, RoiContour, SharedRoiContour, StructureSet, read_lock};
use image::{ImageBuffer, Luma};
use ndarray::Array2;
use ndarray::parallel::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Binary mask of one ROI on one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub roi_contour_uid: String,
    pub sop_instance_uid: String,
    /// Grid of (rows, columns), `true` inside the ROI.
    pub grid: Array2<bool>,
}

impl Mask {
    pub fn new(roi_contour_uid: impl Into<String>, sop_instance_uid: impl Into<String>, dim: (usize, usize)) -> Self {
        Self {
            roi_contour_uid: roi_contour_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
            grid: Array2::from_elem(dim, false),
        }
    }

    /// (rows, columns)
    pub fn dim(&self) -> (usize, usize) {
        self.grid.dim()
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.grid.par_iter().filter(|&&inside| inside).count()
    }

    /// Render as an 8-bit image, 255 inside and 0 outside.
    pub fn to_image(&self) -> ImageBuffer<Luma<u8>, Vec<u8>> {
        let (rows, columns) = self.dim();
        ImageBuffer::from_fn(columns as u32, rows as u32, |x, y| {
            Luma([if self.grid[[y as usize, x as usize]] { 255 } else { 0 }])
        })
    }
}

#[derive(Debug, Default)]
pub struct MaskExtraction {
    pub masks: Vec<Mask>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Work item: every polygon of one ROI lying on one slice.
struct SliceGroup<'a> {
    roi_contour_uid: &'a str,
    slice_index: usize,
    polygons: Vec<&'a Polygon>,
}

pub struct MaskExtractor<'a> {
    geometry: &'a SeriesGeometry,
}

impl<'a> MaskExtractor<'a> {
    pub fn new(geometry: &'a SeriesGeometry) -> Self {
        Self { geometry }
    }

    /// Masks for every ROI contour of a structure set.
    pub fn extract_masks(&self, structure_set: &StructureSet) -> MaskExtraction {
        self.extract_roi_masks(structure_set.roi_contours())
    }

    /// One mask per (ROI, slice) pair holding at least one usable polygon,
    /// ordered by ROI and then by slice position in the series.
    pub fn extract_roi_masks(&self, rois: &[SharedRoiContour]) -> MaskExtraction {
        let guards: Vec<_> = rois.iter().map(|roi| read_lock(roi)).collect();
        let mut extraction = MaskExtraction::default();

        let mut groups = Vec::new();
        for roi in guards.iter() {
            groups.extend(self.group_by_slice(roi, &mut extraction.diagnostics));
        }

        let results: Vec<_> = groups
            .par_iter()
            .map(|group| self.rasterize_group(group))
            .collect();

        for (mask, diagnostics) in results {
            for diagnostic in &diagnostics {
                warn!("{diagnostic}");
            }
            extraction.diagnostics.extend(diagnostics);
            extraction.masks.extend(mask);
        }
        debug!(masks = extraction.masks.len(), "extracted masks");
        extraction
    }

    fn group_by_slice<'r>(&self, roi: &'r RoiContour, diagnostics: &mut Vec<Diagnostic>) -> Vec<SliceGroup<'r>> {
        let mut by_slice: BTreeMap<usize, Vec<&'r Polygon>> = BTreeMap::new();
        for polygon in roi.polygons.iter().filter(|p| !p.points.is_empty()) {
            match self.geometry.slice_index(&polygon.referenced_sop_instance_uid) {
                Some(index) => by_slice.entry(index).or_default().push(polygon),
                None => {
                    let diagnostic = Diagnostic::UnmappedSlice {
                        polygon: polygon.uid.clone(),
                        sop_instance_uid: polygon.referenced_sop_instance_uid.clone(),
                    };
                    warn!("{diagnostic}");
                    diagnostics.push(diagnostic);
                }
            }
        }
        by_slice
            .into_iter()
            .map(|(slice_index, polygons)| SliceGroup {
                roi_contour_uid: &roi.uid,
                slice_index,
                polygons,
            })
            .collect()
    }

    fn rasterize_group(&self, group: &SliceGroup<'_>) -> (Option<Mask>, Vec<Diagnostic>) {
        let slice = &self.geometry.slices[group.slice_index];
        let mut diagnostics = Vec::new();
        let Some(transform) = self.geometry.patient_to_pixel(&slice.sop_instance_uid) else {
            // No usable pixel spacing for this slice.
            diagnostics.extend(group.polygons.iter().map(|polygon| Diagnostic::UnmappedSlice {
                polygon: polygon.uid.clone(),
                sop_instance_uid: slice.sop_instance_uid.clone(),
            }));
            return (None, diagnostics);
        };

        let mut mask = Mask::new(group.roi_contour_uid, &slice.sop_instance_uid, self.geometry.dim());
        let mut filled = 0;
        for polygon in &group.polygons {
            let vertices = dedup_vertices(polygon.points.iter().map(|p| transform.apply(p)));
            if vertices.len() < 3 {
                diagnostics.push(Diagnostic::DegeneratePolygon {
                    polygon: polygon.uid.clone(),
                });
                continue;
            }
            fill_polygon(&mut mask.grid, &vertices);
            filled += 1;
        }

        ((filled > 0).then_some(mask), diagnostics)
    }
}

/// Snap to a micro-pixel lattice so that values such as 9.9999999 land on
/// the integer grid line they were meant to hit.
fn snap(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Drop consecutive repeats and an explicit closing vertex.
fn dedup_vertices(points: impl Iterator<Item = (f64, f64)>) -> Vec<(f64, f64)> {
    let mut vertices: Vec<(f64, f64)> = points.map(|(x, y)| (snap(x), snap(y))).collect();
    vertices.dedup();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices
}

/// Scan-line fill of one closed polygon given in pixel coordinates
/// `(column, row)`, OR-ed into `grid`.
///
/// Even-odd rule sampled at pixel centres. A centre on the left or top
/// boundary is inside, one on the right or bottom boundary is outside, so
/// the square with corners (10, 10) and (20, 20) covers exactly 10 × 10
/// pixels.
pub fn fill_polygon(grid: &mut Array2<bool>, vertices: &[(f64, f64)]) {
    let (rows, columns) = grid.dim();
    if vertices.len() < 3 || rows == 0 || columns == 0 {
        return;
    }
    if vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return;
    }
    let (min_y, max_y) = vertices
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)));
    let first_row = min_y.ceil().max(0.0);
    let end_row = max_y.ceil().min(rows as f64);
    if end_row <= first_row {
        return;
    }

    let mut crossings = Vec::with_capacity(vertices.len());
    for row in first_row as usize..end_row as usize {
        let y = row as f64;
        crossings.clear();
        for (i, &(x0, y0)) in vertices.iter().enumerate() {
            let (x1, y1) = vertices[(i + 1) % vertices.len()];
            if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = span[0].ceil().max(0.0);
            let end = span[1].ceil().min(columns as f64);
            if end <= start {
                continue;
            }
            for column in start as usize..end as usize {
                grid[[row, column]] = true;
            }
        }
    }
}

/// Rasterize a single polygon into a fresh grid of `dim` (rows, columns).
pub fn rasterize_polygon(vertices: &[(f64, f64)], dim: (usize, usize)) -> Array2<bool> {
    let mut grid = Array2::from_elem(dim, false);
    fill_polygon(&mut grid, vertices);
    grid
}
