//! Four-dimensional activation tensors for the convolutional pipeline.

/// A `(batch, maps, rows, cols)` tensor of `f64`, stored row-major.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tensor4 {
    batch: usize,
    maps: usize,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Tensor4 {
    pub fn zeros(batch: usize, maps: usize, rows: usize, cols: usize) -> Self {
        Tensor4 {
            batch: batch,
            maps: maps,
            rows: rows,
            cols: cols,
            data: vec![0.0; batch * maps * rows * cols],
        }
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn maps(&self) -> usize {
        self.maps
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn offset(&self, b: usize, m: usize, r: usize, c: usize) -> usize {
        debug_assert!(b < self.batch && m < self.maps && r < self.rows &&
                      c < self.cols);
        ((b * self.maps + m) * self.rows + r) * self.cols + c
    }

    pub fn get(&self, b: usize, m: usize, r: usize, c: usize) -> f64 {
        self.data[self.offset(b, m, r, c)]
    }

    pub fn set(&mut self, b: usize, m: usize, r: usize, c: usize, value: f64) {
        let i = self.offset(b, m, r, c);
        self.data[i] = value;
    }

    pub fn add(&mut self, b: usize, m: usize, r: usize, c: usize, value: f64) {
        let i = self.offset(b, m, r, c);
        self.data[i] += value;
    }

    /// All maps of one batch item, as a contiguous slice.
    pub fn item(&self, b: usize) -> &[f64] {
        let len = self.maps * self.rows * self.cols;
        &self.data[b * len..(b + 1) * len]
    }

    pub fn item_mut(&mut self, b: usize) -> &mut [f64] {
        let len = self.maps * self.rows * self.cols;
        &mut self.data[b * len..(b + 1) * len]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_row_major_per_item() {
        let mut t = Tensor4::zeros(2, 3, 4, 5);
        t.set(1, 2, 3, 4, 7.0);
        assert_eq!(t.as_slice()[((1 * 3 + 2) * 4 + 3) * 5 + 4], 7.0);
        assert_eq!(t.get(1, 2, 3, 4), 7.0);
        assert_eq!(t.item(1).len(), 3 * 4 * 5);
        assert_eq!(t.item(1)[(2 * 4 + 3) * 5 + 4], 7.0);
    }

    #[test]
    fn add_accumulates() {
        let mut t = Tensor4::zeros(1, 1, 2, 2);
        t.add(0, 0, 1, 1, 1.5);
        t.add(0, 0, 1, 1, 1.5);
        assert_eq!(t.get(0, 0, 1, 1), 3.0);
    }
}
