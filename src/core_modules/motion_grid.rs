// THEORY:
// The `MotionGrid` is the temporal half of the pure-Rust motion detector. It
// slices every frame into a fixed grid of square chunks, reduces each chunk to
// its mean luminance, and compares it with the same chunk in the previous
// frame. The absolute difference is the chunk's "heat".
//
// The grid is stateful but cheap: it only remembers one luminance value per
// chunk. It knows *where* brightness changed, not what changed; turning the heat
// map into objects is the job of `blob_detector`.
//
// Pixels to the right of / below the last full chunk are ignored, and a frame
// with different dimensions resets the grid (the first frame after a reset
// produces an all-zero heat map).

use crate::devices::Frame;

/// Rec. 601 luma weights.
fn luminance(pixel: &image::Rgb<u8>) -> f64 {
    0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64
}

pub struct MotionGrid {
    /// Side of a square chunk in pixels.
    chunk_size: u32,
    /// Dimensions of the frames the grid is currently laid out for.
    frame_dims: (u32, u32),
    grid_width: u32,
    grid_height: u32,
    /// Mean luminance of each chunk in the previous frame, row-major.
    previous_luminance: Option<Vec<f64>>,
}

impl MotionGrid {
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            frame_dims: (0, 0),
            grid_width: 0,
            grid_height: 0,
            previous_luminance: None,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Grid dimensions in chunks for the last processed frame.
    pub fn grid_dims(&self) -> (u32, u32) {
        (self.grid_width, self.grid_height)
    }

    /// Processes one frame and returns the per-chunk heat map, row-major.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<f64> {
        let dims = frame.dimensions();
        if dims != self.frame_dims {
            self.frame_dims = dims;
            self.grid_width = dims.0 / self.chunk_size;
            self.grid_height = dims.1 / self.chunk_size;
            self.previous_luminance = None;
        }

        let current = self.chunk_luminance(frame);
        let heat = match &self.previous_luminance {
            Some(previous) => current
                .iter()
                .zip(previous)
                .map(|(now, before)| (now - before).abs())
                .collect(),
            None => vec![0.0; current.len()],
        };
        self.previous_luminance = Some(current);
        heat
    }

    fn chunk_luminance(&self, frame: &Frame) -> Vec<f64> {
        let num_chunks = (self.grid_width * self.grid_height) as usize;
        let pixels_per_chunk = (self.chunk_size * self.chunk_size) as f64;
        let mut means = Vec::with_capacity(num_chunks);

        for chunk_index in 0..num_chunks as u32 {
            let start_x = (chunk_index % self.grid_width) * self.chunk_size;
            let start_y = (chunk_index / self.grid_width) * self.chunk_size;
            let mut total = 0.0;
            for y in start_y..start_y + self.chunk_size {
                for x in start_x..start_x + self.chunk_size {
                    total += luminance(frame.get_pixel(x, y));
                }
            }
            means.push(total / pixels_per_chunk);
        }

        means
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn first_frame_is_cold() {
        let mut grid = MotionGrid::new(4);
        let heat = grid.process_frame(&solid(16, 8, 200));
        assert_eq!(grid.grid_dims(), (4, 2));
        assert_eq!(heat.len(), 8);
        assert!(heat.iter().all(|h| *h == 0.0));
    }

    #[test]
    fn heat_follows_the_changed_chunk() {
        let mut grid = MotionGrid::new(4);
        grid.process_frame(&solid(8, 8, 10));

        let mut next = solid(8, 8, 10);
        for y in 4..8 {
            for x in 0..4 {
                next.put_pixel(x, y, Rgb([110, 110, 110]));
            }
        }
        let heat = grid.process_frame(&next);
        // Chunk (0, 1) is index 2 in a 2x2 grid.
        assert!((heat[2] - 100.0).abs() < 1e-6);
        assert_eq!(heat[0], 0.0);
        assert_eq!(heat[1], 0.0);
        assert_eq!(heat[3], 0.0);
    }

    #[test]
    fn size_change_resets_history() {
        let mut grid = MotionGrid::new(4);
        grid.process_frame(&solid(8, 8, 0));
        let heat = grid.process_frame(&solid(12, 8, 255));
        assert_eq!(grid.grid_dims(), (3, 2));
        assert!(heat.iter().all(|h| *h == 0.0));
    }

    #[test]
    fn frame_smaller_than_a_chunk_has_no_grid() {
        let mut grid = MotionGrid::new(16);
        assert!(grid.process_frame(&solid(8, 8, 0)).is_empty());
    }
}
