use std::collections::VecDeque;

use super::hsv::Mask;

/// Axis-aligned pixel rectangle enclosing one connected region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub bounds: PixelRect,
    pub area: usize,
}

const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// 8-connected regions of set pixels, in raster order of each region's first
/// pixel (top-most row first, then left-most).
pub fn connected_regions(mask: &Mask) -> Vec<Region> {
    let width = mask.width() as usize;
    let height = mask.height() as usize;
    let mut visited = vec![false; width * height];
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let idx = start_y * width + start_x;
            if visited[idx] || !mask.get(start_x as u32, start_y as u32) {
                continue;
            }

            visited[idx] = true;
            queue.push_back((start_x, start_y));
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (start_x, start_y, start_x, start_y);
            let mut area = 0usize;

            while let Some((x, y)) = queue.pop_front() {
                area += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                for (dx, dy) in NEIGHBOURS {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    let nidx = ny * width + nx;
                    if !visited[nidx] && mask.get(nx as u32, ny as u32) {
                        visited[nidx] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            regions.push(Region {
                bounds: PixelRect {
                    x: min_x as u32,
                    y: min_y as u32,
                    w: (max_x - min_x + 1) as u32,
                    h: (max_y - min_y + 1) as u32,
                },
                area,
            });
        }
    }

    regions
}

/// First region in raster order, if any.
pub fn first_region(mask: &Mask) -> Option<Region> {
    connected_regions(mask).into_iter().next()
}
