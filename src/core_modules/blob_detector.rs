// THEORY:
// The blob detector is the spatial half of the motion detector. It turns the
// per-chunk heat map produced by `MotionGrid` into spatially coherent regions
// with a "peak finding and region growing" pass:
//
// 1.  **Peak Finding (Seeding)**: a chunk is a seed when its heat reaches the
//     seed threshold and no 8-neighbour is hotter. Seeds are the epicentres of
//     change.
// 2.  **Region Growing**: from each unvisited seed a breadth-first walk over the
//     4-neighbours adds every chunk whose heat stays above the grow threshold.
//     The grow threshold is the "cold edge" of a region.
// 3.  **Aggregation**: each grown region is summarised into a `MotionBlob`
//     (bounding box, size, average heat, heat-weighted centre).
//
// The detector is stateless: one heat map in, one list of blobs out.

use std::collections::VecDeque;

/// A coordinate on the chunk grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// One contiguous region of change in a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionBlob {
    /// Top-left and bottom-right chunk, inclusive.
    pub bounding_box: (Point, Point),
    pub size_in_chunks: usize,
    pub average_heat: f64,
    /// Heat-weighted centre, in chunk units.
    pub center_of_mass: (f64, f64),
}

#[derive(Debug, Clone, Copy)]
pub struct BlobThresholds {
    /// Minimum heat of a seed chunk.
    pub seed: f64,
    /// Minimum heat of a chunk joining a growing region.
    pub grow: f64,
}

impl Default for BlobThresholds {
    fn default() -> Self {
        Self {
            seed: 12.0,
            grow: 6.0,
        }
    }
}

pub fn find_blobs(
    heat: &[f64],
    grid_width: u32,
    grid_height: u32,
    thresholds: BlobThresholds,
) -> Vec<MotionBlob> {
    let (w, h) = (grid_width as usize, grid_height as usize);
    if w == 0 || h == 0 || heat.len() < w * h {
        return Vec::new();
    }
    let at = |x: usize, y: usize| heat[y * w + x];

    // --- 1. Peak Finding ---
    let mut peaks = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let value = at(x, y);
            if value < thresholds.seed {
                continue;
            }
            let mut is_peak = true;
            'neighbours: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if nx >= 0 && ny >= 0 && (nx as usize) < w && (ny as usize) < h && at(nx as usize, ny as usize) > value {
                        is_peak = false;
                        break 'neighbours;
                    }
                }
            }
            if is_peak {
                peaks.push(Point { x: x as u32, y: y as u32 });
            }
        }
    }

    // --- 2. Region Growing ---
    let mut visited = vec![false; w * h];
    let mut blobs = Vec::new();
    for peak in peaks {
        let index = peak.y as usize * w + peak.x as usize;
        if visited[index] {
            continue;
        }
        visited[index] = true;
        blobs.push(grow_region(peak, heat, w, h, thresholds.grow, &mut visited));
    }

    blobs
}

fn grow_region(
    peak: Point,
    heat: &[f64],
    w: usize,
    h: usize,
    grow_threshold: f64,
    visited: &mut [bool],
) -> MotionBlob {
    let mut members = Vec::new();
    let mut queue = VecDeque::from([peak]);

    while let Some(current) = queue.pop_front() {
        members.push(current);
        for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
            let (nx, ny) = (current.x as i64 + dx, current.y as i64 + dy);
            if nx < 0 || ny < 0 || nx as usize >= w || ny as usize >= h {
                continue;
            }
            let index = ny as usize * w + nx as usize;
            if !visited[index] && heat[index] >= grow_threshold {
                visited[index] = true;
                queue.push_back(Point { x: nx as u32, y: ny as u32 });
            }
        }
    }

    // --- 3. Aggregation ---
    let mut min = Point { x: u32::MAX, y: u32::MAX };
    let mut max = Point { x: 0, y: 0 };
    let (mut total_heat, mut cx, mut cy) = (0.0, 0.0, 0.0);
    for point in &members {
        min.x = min.x.min(point.x);
        min.y = min.y.min(point.y);
        max.x = max.x.max(point.x);
        max.y = max.y.max(point.y);
        let value = heat[point.y as usize * w + point.x as usize];
        total_heat += value;
        cx += point.x as f64 * value;
        cy += point.y as f64 * value;
    }

    MotionBlob {
        bounding_box: (min, max),
        size_in_chunks: members.len(),
        average_heat: total_heat / members.len() as f64,
        center_of_mass: (cx / total_heat, cy / total_heat),
    }
}
