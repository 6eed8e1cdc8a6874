//! Connected components of a binary image and their outer boundaries.

use image::GrayImage;

/// Clockwise (y down) Moore neighbourhood, starting east.
const RING: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

fn ring_index(dx: i32, dy: i32) -> Option<usize> {
    RING.iter().position(|&d| d == (dx, dy))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Component {
    pub label: u32,
    pub area: usize,
    /// First pixel in raster order.
    pub start: (i32, i32),
    pub min: (i32, i32),
    pub max: (i32, i32),
}

impl Component {
    pub fn touches_border(&self, width: u32, height: u32) -> bool {
        self.min.0 <= 0
            || self.min.1 <= 0
            || self.max.0 >= width as i32 - 1
            || self.max.1 >= height as i32 - 1
    }
}

/// 8-connected labelling of non-zero pixels; label 0 is background.
pub struct Labels {
    pub width: u32,
    pub height: u32,
    labels: Vec<u32>,
    pub components: Vec<Component>,
}

impl Labels {
    pub fn new(binary: &GrayImage) -> Self {
        let (w, h) = binary.dimensions();
        let (wi, hi) = (w as i32, h as i32);
        let mut labels = vec![0u32; (w as usize) * (h as usize)];
        let mut components = Vec::new();
        let mut stack = Vec::new();

        for y in 0..hi {
            for x in 0..wi {
                let idx = (y * wi + x) as usize;
                if labels[idx] != 0 || binary.get_pixel(x as u32, y as u32)[0] == 0 {
                    continue;
                }
                let label = components.len() as u32 + 1;
                let mut comp = Component {
                    label,
                    area: 0,
                    start: (x, y),
                    min: (x, y),
                    max: (x, y),
                };
                labels[idx] = label;
                stack.push((x, y));
                while let Some((px, py)) = stack.pop() {
                    comp.area += 1;
                    comp.min = (comp.min.0.min(px), comp.min.1.min(py));
                    comp.max = (comp.max.0.max(px), comp.max.1.max(py));
                    for (dx, dy) in RING {
                        let (qx, qy) = (px + dx, py + dy);
                        if qx < 0 || qy < 0 || qx >= wi || qy >= hi {
                            continue;
                        }
                        let qi = (qy * wi + qx) as usize;
                        if labels[qi] == 0 && binary.get_pixel(qx as u32, qy as u32)[0] != 0 {
                            labels[qi] = label;
                            stack.push((qx, qy));
                        }
                    }
                }
                components.push(comp);
            }
        }

        Self {
            width: w,
            height: h,
            labels,
            components,
        }
    }

    #[inline]
    pub fn label_at(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.labels[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Next boundary pixel clockwise around `current`, scanning from the
    /// backtrack direction; also returns the new backtrack seen from it.
    fn step(&self, current: (i32, i32), back: usize, label: u32) -> Option<((i32, i32), usize)> {
        for k in 1..=8 {
            let dir = (back + k) % 8;
            let q = (current.0 + RING[dir].0, current.1 + RING[dir].1);
            if self.label_at(q.0, q.1) == label {
                let prev = (back + k - 1) % 8;
                let b = (current.0 + RING[prev].0, current.1 + RING[prev].1);
                return ring_index(b.0 - q.0, b.1 - q.1).map(|d| (q, d));
            }
        }
        None
    }

    /// Outer boundary of a component by Moore-neighbour tracing, clockwise
    /// in image coordinates, starting at the component's raster-first pixel.
    pub fn trace_boundary(&self, comp: &Component) -> Vec<(i32, i32)> {
        let start = comp.start;
        // The raster-first pixel always has background to its west.
        let Some((first, back)) = self.step(start, WEST, comp.label) else {
            return vec![start];
        };

        let mut contour = vec![start];
        let (mut current, mut back) = (first, back);
        for _ in 0..4 * comp.area + 8 {
            let Some((next, b)) = self.step(current, back, comp.label) else {
                break;
            };
            if current == start && next == first {
                break;
            }
            contour.push(current);
            current = next;
            back = b;
        }
        contour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn binary(w: u32, h: u32, on: &[(u32, u32)]) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        for &(x, y) in on {
            img.put_pixel(x, y, Luma([255]));
        }
        img
    }

    #[test]
    fn labels_are_eight_connected() {
        let img = binary(6, 6, &[(1, 1), (2, 2), (4, 4), (4, 1)]);
        let labels = Labels::new(&img);
        assert_eq!(labels.components.len(), 3);
        assert_eq!(labels.components[0].area, 2);
        assert_eq!(labels.label_at(1, 1), labels.label_at(2, 2));
        assert_ne!(labels.label_at(4, 4), labels.label_at(4, 1));
    }

    #[test]
    fn square_boundary_is_traced_clockwise() {
        let mut on = Vec::new();
        for y in 2..6 {
            for x in 3..8 {
                on.push((x, y));
            }
        }
        let img = binary(12, 10, &on);
        let labels = Labels::new(&img);
        let comp = labels.components[0];
        assert!(!comp.touches_border(12, 10));
        let contour = labels.trace_boundary(&comp);

        // perimeter pixels of a 5x4 block
        assert_eq!(contour.len(), 2 * 5 + 2 * 4 - 4);
        assert_eq!(contour[0], (3, 2));
        assert_eq!(contour[1], (4, 2));
        for corner in [(7, 2), (7, 5), (3, 5)] {
            assert!(contour.contains(&corner));
        }
        let mut unique = contour.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), contour.len());
    }

    #[test]
    fn single_pixel_and_border_components() {
        let img = binary(5, 5, &[(2, 2), (0, 4)]);
        let labels = Labels::new(&img);
        let inner = labels.components.iter().find(|c| c.start == (2, 2)).unwrap();
        assert_eq!(labels.trace_boundary(inner), vec![(2, 2)]);
        let edge = labels.components.iter().find(|c| c.start == (0, 4)).unwrap();
        assert!(edge.touches_border(5, 5));
    }
}
