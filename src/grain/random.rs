use rand::Rng;

use super::GrainParameters;
use crate::{
    registry::FileRegistry,
    settings::{ms_to_frames, GranularSettings, SAMPLE_RATE},
};

// -------------------------------------------------------------------------------------------------

/// Create new random grain parameters for a file from the given non empty registry.
///
/// The generator is consumed in this fixed order: file index, duration, start frame,
/// amplitude, loop enable, loop window, loop drag. The last two only when looping and the
/// start frame only when the file is longer than the grain. A seeded generator thus always
/// produces the same grain sequence for the same settings and files.
pub fn generate_random_grain<R: Rng + ?Sized>(
    files: &FileRegistry,
    settings: &GranularSettings,
    rng: &mut R,
) -> Option<GrainParameters> {
    if files.is_empty() {
        return None;
    }
    let settings = settings.sanitized();
    let file_index = rng.random_range(0..files.len());
    let file = files.get(file_index)?;
    let total_frames = file.total_frames();

    let duration_ms = rng.random_range(settings.min_grain_ms..=settings.max_grain_ms);
    let mut duration_frames = ms_to_frames(duration_ms, SAMPLE_RATE);

    let start_frame = if total_frames > duration_frames as u64 {
        rng.random_range(0..=total_frames - duration_frames as u64)
    } else {
        duration_frames = total_frames as usize;
        0
    };

    let amplitude = rng.random_range(0.3f32..=0.7f32);

    let loop_enabled = rng.random_bool(settings.loop_probability as f64);
    let (loop_window_frames, loop_drag_frames) = if loop_enabled {
        let window_ms = rng.random_range(settings.min_loop_window_ms..=settings.max_loop_window_ms);
        let window_frames = (ms_to_frames(window_ms, file.sample_rate()) as u64)
            .max(1)
            .min((total_frames / 4).max(1));

        let max_drag_ms = settings.max_loop_drag_ms as i64;
        let drag_ms = rng.random_range(-max_drag_ms..=max_drag_ms);
        let drag_frames = drag_ms * file.sample_rate() as i64 / 1000;

        (window_frames, drag_frames)
    } else {
        (0, 0)
    };

    Some(GrainParameters {
        file_index,
        start_frame,
        duration_frames,
        amplitude,
        loop_enabled,
        loop_window_frames,
        loop_drag_frames,
    })
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::registry::FileEntry;

    fn registry() -> FileRegistry {
        FileRegistry::from_entries(vec![
            FileEntry::new("/a.mp3", "a.mp3", 44100, 2, 44100 * 60),
            FileEntry::new("/b.mp3", "b.mp3", 48000, 1, 48000 * 10),
            FileEntry::new("/c.mp3", "c.mp3", 22050, 2, 1000),
        ])
    }

    #[test]
    fn empty_registry() {
        let mut rng = SmallRng::seed_from_u64(1);
        let settings = GranularSettings::default();
        assert!(generate_random_grain(&FileRegistry::new(), &settings, &mut rng).is_none());
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let files = registry();
        let settings = GranularSettings::default().loop_probability(0.5);
        let sequence = |seed| {
            let mut rng = SmallRng::seed_from_u64(seed);
            (0..200)
                .map(|_| generate_random_grain(&files, &settings, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(sequence(1234), sequence(1234));
        assert_ne!(sequence(1234), sequence(4321));
    }

    #[test]
    fn grains_stay_in_range() {
        let files = registry();
        let settings = GranularSettings::default()
            .grain_duration_ms(10, 100)
            .loop_probability(1.0)
            .loop_window_ms(5, 50)
            .max_loop_drag_ms(20);
        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..1000 {
            let grain = generate_random_grain(&files, &settings, &mut rng).unwrap();
            let file = files.get(grain.file_index).unwrap();
            assert!((0.3..=0.7).contains(&grain.amplitude));
            assert!(grain.start_frame + grain.duration_frames as u64 <= file.total_frames());
            assert!(grain.duration_frames <= ms_to_frames(100, SAMPLE_RATE));
            assert!(grain.loop_enabled);
            assert!(grain.loop_window_frames >= 1);
            assert!(grain.loop_window_frames <= (file.total_frames() / 4).max(1));
            let max_drag = 20 * file.sample_rate() as i64 / 1000;
            assert!(grain.loop_drag_frames.abs() <= max_drag);
        }
    }

    #[test]
    fn short_files_clamp_duration() {
        let files = FileRegistry::from_entries(vec![FileEntry::new(
            "/short.mp3",
            "short.mp3",
            44100,
            2,
            1000,
        )]);
        let settings = GranularSettings::default().grain_duration_ms(500, 500);
        let mut rng = SmallRng::seed_from_u64(7);
        let grain = generate_random_grain(&files, &settings, &mut rng).unwrap();
        assert_eq!(grain.start_frame, 0);
        assert_eq!(grain.duration_frames, 1000);
        assert!(!grain.loop_enabled);
        assert_eq!(grain.loop_window_frames, 0);
        assert_eq!(grain.loop_drag_frames, 0);
    }
}
