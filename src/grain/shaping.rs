use std::f32::consts::PI;

use rand::Rng;

// -------------------------------------------------------------------------------------------------

/// Create `frame_count` frames of uniform white noise in range `-amplitude..=amplitude`.
pub fn white_noise<R: Rng + ?Sized>(
    frame_count: usize,
    channel_count: usize,
    amplitude: f32,
    rng: &mut R,
) -> Vec<f32> {
    if amplitude.is_nan() || amplitude == 0.0 {
        return vec![0.0; frame_count * channel_count];
    }
    let amplitude = amplitude.abs().min(1.0);
    (0..frame_count * channel_count)
        .map(|_| rng.random_range(-amplitude..=amplitude))
        .collect()
}

/// Fade the given interleaved buffer in and out with a Hann window.
pub fn apply_hann_envelope(samples: &mut [f32], channel_count: usize) {
    if channel_count == 0 {
        return;
    }
    let frame_count = samples.len() / channel_count;
    if frame_count < 2 {
        return;
    }
    for (index, frame) in samples.chunks_exact_mut(channel_count).enumerate() {
        let phase = index as f32 / (frame_count - 1) as f32;
        let gain = 0.5 * (1.0 - (2.0 * PI * phase).cos());
        for sample in frame {
            *sample *= gain;
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;

    #[test]
    fn noise_is_bounded() {
        let mut rng = SmallRng::seed_from_u64(3);
        let noise = white_noise(4800, 2, 0.25, &mut rng);
        assert_eq!(noise.len(), 9600);
        assert!(noise.iter().all(|s| (-0.25..=0.25).contains(s)));
        assert!(noise.iter().any(|s| *s != 0.0));

        let silence = white_noise(16, 2, 0.0, &mut rng);
        assert!(silence.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn hann_envelope() {
        let mut samples = vec![1.0; 2 * 101];
        apply_hann_envelope(&mut samples, 2);
        assert_abs_diff_eq!(samples[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(samples[1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(samples[100], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(samples[201], 0.0, epsilon = 1e-6);
    }
}
