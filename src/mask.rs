use std::ops::Range;

use burn::config::Config;
use ndarray::{Array2, Axis, Slice};
use rand::Rng;

/// Frequency and time masking on a `[n_mels, frames]` log-mel spectrogram.
#[derive(Config, Debug)]
pub struct SpecAugmentConfig {
    #[config(default = 30)]
    pub freq_mask_param: usize,
    #[config(default = 80)]
    pub time_mask_param: usize,
    #[config(default = 0.0)]
    pub mask_value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskAxis {
    Frequency,
    Time,
}

impl MaskAxis {
    fn axis(&self) -> Axis {
        match self {
            MaskAxis::Frequency => Axis(0),
            MaskAxis::Time => Axis(1),
        }
    }
}

/// Draws one contiguous span of at most `mask_param` positions out of
/// `axis_len`.
pub fn mask_span<R: Rng + ?Sized>(axis_len: usize, mask_param: usize, rng: &mut R) -> Range<usize> {
    let width = (rng.gen::<f32>() * mask_param as f32) as usize;
    let width = width.min(axis_len);
    let start = (rng.gen::<f32>() * (axis_len - width) as f32) as usize;

    start..start + width
}

pub fn mask_along_axis<R: Rng + ?Sized>(
    spec: &mut Array2<f32>,
    axis: MaskAxis,
    mask_param: usize,
    mask_value: f32,
    rng: &mut R,
) -> Range<usize> {
    let axis_len = spec.len_of(axis.axis());
    let span = mask_span(axis_len, mask_param, rng);

    spec.slice_axis_mut(axis.axis(), Slice::from(span.clone()))
        .fill(mask_value);

    span
}

impl SpecAugmentConfig {
    pub fn apply<R: Rng + ?Sized>(&self, spec: &mut Array2<f32>, rng: &mut R) {
        mask_along_axis(spec, MaskAxis::Frequency, self.freq_mask_param, self.mask_value, rng);
        mask_along_axis(spec, MaskAxis::Time, self.time_mask_param, self.mask_value, rng);
    }
}

#[test]
fn test_mask_span_stays_in_bounds() {
    use rand::SeedableRng;

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);

    for _ in 0..1_000 {
        let span = mask_span(128, 30, &mut rng);
        assert!(span.end <= 128);
        assert!(span.len() < 30);
    }
}

#[test]
fn test_mask_span_caps_width_at_axis_len() {
    use rand::SeedableRng;

    let mut rng = rand::rngs::StdRng::seed_from_u64(11);

    for _ in 0..1_000 {
        let span = mask_span(22, 80, &mut rng);
        assert!(span.end <= 22);
    }
}

#[test]
fn test_time_mask_zeroes_a_column_block() {
    use rand::SeedableRng;

    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let mut spec = Array2::<f32>::from_elem((16, 40), -20.0);

    let span = mask_along_axis(&mut spec, MaskAxis::Time, 10, 0.0, &mut rng);

    for (frame, column) in spec.axis_iter(Axis(1)).enumerate() {
        let expected = if span.contains(&frame) { 0.0 } else { -20.0 };
        assert!(column.iter().all(|v| *v == expected));
    }
}
