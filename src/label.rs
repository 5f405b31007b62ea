//! Connected-component labeling of binary masks.

use dataset::Grid;

/// One connected component of foreground pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// `[row, col]` of every member pixel, in scan order.
    pub coordinates: Vec<[usize; 2]>,
}

impl Region {
    /// Mean position of the member pixels.
    pub fn center_of_mass(&self) -> (f64, f64) {
        let n = self.coordinates.len() as f64;
        let (mut r, mut c) = (0.0, 0.0);
        for coord in &self.coordinates {
            r += coord[0] as f64;
            c += coord[1] as f64;
        }
        (r / n, c / n)
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// Groups nonzero pixels of `mask` into 8-connected components, in scan
/// order. An all-zero mask yields no regions; an all-one mask yields one.
pub fn connected_components(mask: &Grid) -> Vec<Region> {
    let (rows, cols) = (mask.rows(), mask.cols());
    let mut visited = vec![false; rows * cols];
    let mut regions = Vec::new();
    let mut frontier: Vec<(usize, usize)> = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            if visited[r * cols + c] || mask.get(r, c) == 0.0 {
                continue;
            }
            let mut coordinates = Vec::new();
            visited[r * cols + c] = true;
            frontier.push((r, c));
            while let Some((fr, fc)) = frontier.pop() {
                coordinates.push([fr, fc]);
                for dr in -1i64..2 {
                    for dc in -1i64..2 {
                        let (nr, nc) = (fr as i64 + dr, fc as i64 + dc);
                        if nr < 0 || nr >= rows as i64 || nc < 0 ||
                           nc >= cols as i64 {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        if !visited[nr * cols + nc] &&
                           mask.get(nr, nc) != 0.0 {
                            visited[nr * cols + nc] = true;
                            frontier.push((nr, nc));
                        }
                    }
                }
            }
            coordinates.sort();
            regions.push(Region { coordinates: coordinates });
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_mask_has_no_regions() {
        assert!(connected_components(&Grid::zeros(5, 5)).is_empty());
    }

    #[test]
    fn all_one_mask_is_one_region() {
        let mask = Grid::from_fn(4, 5, |_, _| 1.0);
        let regions = connected_components(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].len(), 20);
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mut mask = Grid::zeros(4, 4);
        mask.set(1, 1, 1.0);
        mask.set(2, 2, 1.0);
        let regions = connected_components(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].coordinates, vec![[1, 1], [2, 2]]);
    }

    #[test]
    fn separated_blocks_are_distinct_regions() {
        let mut mask = Grid::zeros(8, 8);
        mask.set(0, 0, 1.0);
        for r in 4..6 {
            for c in 4..6 {
                mask.set(r, c, 1.0);
            }
        }
        let regions = connected_components(&mask);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].coordinates, vec![[0, 0]]);
        assert_eq!(regions[1].len(), 4);
        assert_eq!(regions[1].center_of_mass(), (4.5, 4.5));
    }
}
