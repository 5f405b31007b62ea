//! Convolutional layer with orthogonal initialization and optional maxpool.
//!
//! The forward order is `elu(maxpool(conv(x)) + b)`: pooling (when enabled)
//! runs on the raw convolution output, and the per-map bias and nonlinearity
//! are applied after it. Convolution uses "half" padding, so the spatial size
//! is preserved and only pooling shrinks it.

use activator::Activator;
use error::Result;
use init;
use matrix::Mat;
use tensor::Tensor4;
use utils::ZeroOut;

use rblas::attribute::Transpose;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConvLayer {
    /// One flattened `(in_maps, kh, kw)` filter per row.
    weights: Mat,
    bias: Vec<f64>,
    in_maps: usize,
    out_maps: usize,
    kh: usize,
    kw: usize,
    maxpool: bool,
}

/// Gradient accumulators matching a `ConvLayer`'s parameters.
#[derive(Debug)]
pub struct ConvGrads {
    pub weights: Mat,
    pub bias: Vec<f64>,
}

impl ZeroOut for ConvGrads {
    fn zero_out(&mut self) {
        self.weights.zero_out();
        self.bias.zero_out();
    }
}

/// Forward-pass state retained for the backward pass.
#[derive(Debug)]
pub struct ConvCache {
    pub input: Tensor4,
    pub output: Tensor4,
    /// Per pooled element, the flat within-item index of the winning pixel in
    /// the pre-pool convolution output. Present only when pooling.
    switches: Option<Vec<usize>>,
}

impl ConvLayer {
    pub fn new(in_maps: usize,
               out_maps: usize,
               kh: usize,
               kw: usize,
               maxpool: bool)
               -> Result<Self> {
        Ok(ConvLayer {
            weights: init::conv_orthogonal(out_maps, in_maps, kh, kw)?,
            bias: vec![0.0; out_maps],
            in_maps: in_maps,
            out_maps: out_maps,
            kh: kh,
            kw: kw,
            maxpool: maxpool,
        })
    }

    pub fn in_maps(&self) -> usize {
        self.in_maps
    }

    pub fn out_maps(&self) -> usize {
        self.out_maps
    }

    /// Spatial output size for a given spatial input size.
    pub fn output_spatial(&self, h: usize, w: usize) -> (usize, usize) {
        let (ch, cw) = conv_spatial(h, w, self.kh, self.kw);
        if self.maxpool { (ch / 2, cw / 2) } else { (ch, cw) }
    }

    pub fn new_grads(&self) -> ConvGrads {
        ConvGrads {
            weights: Mat::zeros(self.weights.rows(), self.weights.cols()),
            bias: vec![0.0; self.out_maps],
        }
    }

    pub fn parameters(&mut self) -> (&mut Mat, &mut Vec<f64>) {
        (&mut self.weights, &mut self.bias)
    }

    pub fn forward(&self, input: Tensor4) -> ConvCache {
        assert_eq!(input.maps(), self.in_maps);
        let batch = input.batch();
        let (h, w) = (input.rows(), input.cols());
        let (ch, cw) = conv_spatial(h, w, self.kh, self.kw);
        let pixels = ch * cw;

        let mut conv = Tensor4::zeros(batch, self.out_maps, ch, cw);
        let mut out_mat = Mat::zeros(self.out_maps, pixels);
        for b in 0..batch {
            let cols = im2col(input.item(b), self.in_maps, h, w, self.kh,
                              self.kw);
            Mat::gemm(1.0,
                      &self.weights,
                      Transpose::NoTrans,
                      &cols,
                      Transpose::NoTrans,
                      0.0,
                      &mut out_mat);
            unpack_maps(&out_mat, conv.item_mut(b));
        }

        let (mut output, switches) = if self.maxpool {
            let (pooled, switches) = max_pool(&conv);
            (pooled, Some(switches))
        } else {
            (conv, None)
        };

        let maps = self.out_maps;
        let (or_, oc) = (output.rows(), output.cols());
        for b in 0..batch {
            let item = output.item_mut(b);
            for m in 0..maps {
                let bias = self.bias[m];
                for px in &mut item[m * or_ * oc..(m + 1) * or_ * oc] {
                    *px = Activator::Elu.f(*px + bias);
                }
            }
        }

        ConvCache {
            input: input,
            output: output,
            switches: switches,
        }
    }

    /// Propagates `grad_out` back through the layer, accumulating parameter
    /// gradients into `grads` and returning the gradient w.r.t. the input.
    pub fn backward(&self,
                    cache: &ConvCache,
                    grad_out: &Tensor4,
                    grads: &mut ConvGrads)
                    -> Tensor4 {
        let batch = cache.input.batch();
        let (h, w) = (cache.input.rows(), cache.input.cols());
        let (ch, cw) = conv_spatial(h, w, self.kh, self.kw);
        let pixels = ch * cw;

        // Bias and activation first: dz = dy * elu'(y), summed per map for
        // the bias gradient.
        let mut dz = grad_out.clone();
        {
            let dz_slice = dz.as_mut_slice();
            let y_slice = cache.output.as_slice();
            let per_map = cache.output.rows() * cache.output.cols();
            for i in 0..dz_slice.len() {
                dz_slice[i] *= Activator::Elu.fprime(y_slice[i]);
                let m = (i / per_map) % self.out_maps;
                grads.bias[m] += dz_slice[i];
            }
        }

        // Undo the pooling by routing each pooled gradient to the pixel that
        // won the max.
        let dconv = match cache.switches {
            Some(ref switches) => {
                let mut dconv = Tensor4::zeros(batch, self.out_maps, ch, cw);
                let pooled_len = dz.maps() * dz.rows() * dz.cols();
                for b in 0..batch {
                    let src = dz.item(b);
                    let dst = dconv.item_mut(b);
                    for i in 0..pooled_len {
                        dst[switches[b * pooled_len + i]] += src[i];
                    }
                }
                dconv
            }
            None => dz,
        };

        let mut grad_input = Tensor4::zeros(batch, self.in_maps, h, w);
        let mut dout_mat = Mat::zeros(self.out_maps, pixels);
        let mut dcols = Mat::zeros(self.in_maps * self.kh * self.kw, pixels);
        for b in 0..batch {
            pack_maps(dconv.item(b), &mut dout_mat);
            let cols = im2col(cache.input.item(b), self.in_maps, h, w,
                              self.kh, self.kw);
            Mat::gemm(1.0,
                      &dout_mat,
                      Transpose::NoTrans,
                      &cols,
                      Transpose::Trans,
                      1.0,
                      &mut grads.weights);
            Mat::gemm(1.0,
                      &self.weights,
                      Transpose::Trans,
                      &dout_mat,
                      Transpose::NoTrans,
                      0.0,
                      &mut dcols);
            col2im_add(&dcols,
                       grad_input.item_mut(b),
                       self.in_maps,
                       h,
                       w,
                       self.kh,
                       self.kw);
        }
        grad_input
    }
}

/// Output spatial size of a "half"-padded convolution.
fn conv_spatial(h: usize, w: usize, kh: usize, kw: usize) -> (usize, usize) {
    (h + 2 * (kh / 2) - kh + 1, w + 2 * (kw / 2) - kw + 1)
}

/// Unfolds an item's maps into the `(maps * kh * kw, out_pixels)` column
/// block of a "half"-padded convolution. Out-of-image taps read as zero.
fn im2col(item: &[f64],
          maps: usize,
          h: usize,
          w: usize,
          kh: usize,
          kw: usize)
          -> Mat {
    let (ph, pw) = (kh / 2, kw / 2);
    let (oh, ow) = conv_spatial(h, w, kh, kw);
    Mat::from_fn(maps * kh * kw, oh * ow, |row, col| {
        let m = row / (kh * kw);
        let dy = (row / kw) % kh;
        let dx = row % kw;
        let iy = (col / ow + dy) as isize - ph as isize;
        let ix = (col % ow + dx) as isize - pw as isize;
        if iy >= 0 && iy < h as isize && ix >= 0 && ix < w as isize {
            item[(m * h + iy as usize) * w + ix as usize]
        } else {
            0.0
        }
    })
}

/// Folds a column-block gradient back onto an item, accumulating overlaps.
fn col2im_add(dcols: &Mat,
              item: &mut [f64],
              maps: usize,
              h: usize,
              w: usize,
              kh: usize,
              kw: usize) {
    let (ph, pw) = (kh / 2, kw / 2);
    let (oh, ow) = conv_spatial(h, w, kh, kw);
    debug_assert_eq!(dcols.rows(), maps * kh * kw);
    debug_assert_eq!(dcols.cols(), oh * ow);
    for row in 0..dcols.rows() {
        let m = row / (kh * kw);
        let dy = (row / kw) % kh;
        let dx = row % kw;
        for col in 0..dcols.cols() {
            let iy = (col / ow + dy) as isize - ph as isize;
            let ix = (col % ow + dx) as isize - pw as isize;
            if iy >= 0 && iy < h as isize && ix >= 0 && ix < w as isize {
                item[(m * h + iy as usize) * w + ix as usize] +=
                    dcols[(row, col)];
            }
        }
    }
}

/// Copies an item's `(maps, pixels)` row-major block into a matrix.
fn pack_maps(item: &[f64], mat: &mut Mat) {
    let (maps, pixels) = (mat.rows(), mat.cols());
    debug_assert_eq!(item.len(), maps * pixels);
    for m in 0..maps {
        for p in 0..pixels {
            mat[(m, p)] = item[m * pixels + p];
        }
    }
}

/// Inverse of `pack_maps`.
fn unpack_maps(mat: &Mat, item: &mut [f64]) {
    let (maps, pixels) = (mat.rows(), mat.cols());
    debug_assert_eq!(item.len(), maps * pixels);
    for m in 0..maps {
        for p in 0..pixels {
            item[m * pixels + p] = mat[(m, p)];
        }
    }
}

/// Non-overlapping 2x2 max pooling with border discard. Returns the pooled
/// tensor and, per pooled element, the flat within-item index of the maximum.
fn max_pool(conv: &Tensor4) -> (Tensor4, Vec<usize>) {
    let (batch, maps) = (conv.batch(), conv.maps());
    let (h, w) = (conv.rows(), conv.cols());
    let (ph, pw) = (h / 2, w / 2);
    let mut pooled = Tensor4::zeros(batch, maps, ph, pw);
    let mut switches = vec![0; batch * maps * ph * pw];
    let mut i = 0;
    for b in 0..batch {
        for m in 0..maps {
            for pr in 0..ph {
                for pc in 0..pw {
                    let mut best = ::std::f64::NEG_INFINITY;
                    let mut best_at = 0;
                    for dr in 0..2 {
                        for dc in 0..2 {
                            let (r, c) = (2 * pr + dr, 2 * pc + dc);
                            let v = conv.get(b, m, r, c);
                            if v > best {
                                best = v;
                                best_at = (m * h + r) * w + c;
                            }
                        }
                    }
                    pooled.set(b, m, pr, pc, best);
                    switches[i] = best_at;
                    i += 1;
                }
            }
        }
    }
    (pooled, switches)
}
