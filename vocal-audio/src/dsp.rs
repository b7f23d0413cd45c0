pub fn downmix_interleaved_to_mono(interleaved: &[f32], channels: usize, mono: &mut Vec<f32>) {
    debug_assert!(channels > 0);

    let frames = interleaved.len() / channels.max(1);
    mono.clear();
    mono.reserve(frames);
    for frame in interleaved.chunks_exact(channels.max(1)) {
        mono.push(downmix_frame_to_mono(frame));
    }
}

#[inline]
fn downmix_frame_to_mono(frame: &[f32]) -> f32 {
    match frame.len() {
        0 => 0.0f32,
        1 => frame[0],
        2 => {
            let (l, r) = (frame[0], frame[1]);
            if (l - r).abs() < 1e-4 {
                l
            } else {
                (l + r) * 0.5f32
            }
        }
        n => frame.iter().take(n).copied().sum::<f32>() / (n as f32),
    }
}

/// Copies mono samples into every channel of an interleaved buffer.
pub fn upmix_mono_to_interleaved(mono: &[f32], channels: usize, interleaved: &mut [f32]) {
    debug_assert!(channels > 0);

    for (frame, &sample) in interleaved.chunks_exact_mut(channels.max(1)).zip(mono) {
        frame.fill(sample);
    }
}

/// Linear gain ramp, so volume changes never step within a single sample.
#[derive(Debug, Clone)]
pub struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: usize,
    ramp_samples: usize,
}

impl GainRamp {
    pub fn new(gain: f32, ramp_samples: usize) -> Self {
        Self {
            current: gain,
            target: gain,
            step: 0.0,
            remaining: 0,
            ramp_samples: ramp_samples.max(1),
        }
    }

    /// Starts a new ramp from the current gain. Reaches `target` after `ramp_samples` samples.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        self.step = (target - self.current) / self.ramp_samples as f32;
        self.remaining = self.ramp_samples;
    }

    pub fn apply(&mut self, samples: &mut [f32]) {
        if self.remaining == 0 {
            if self.current != 1.0 {
                samples.iter_mut().for_each(|s| *s *= self.current);
            }
            return;
        }

        for sample in samples {
            if self.remaining > 0 {
                self.remaining -= 1;
                self.current = if self.remaining == 0 {
                    self.target
                } else {
                    self.current + self.step
                };
            }
            *sample *= self.current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn downmix_stereo() {
        let mut mono = Vec::new();
        downmix_interleaved_to_mono(&[0.5, 0.5, 1.0, 0.0, -0.2, 0.2], 2, &mut mono);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_mono_is_copy() {
        let mut mono = vec![9.0; 10];
        downmix_interleaved_to_mono(&[0.1, 0.2, 0.3], 1, &mut mono);
        assert_eq!(mono, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn upmix_duplicates_channels() {
        let mut out = [0.0; 6];
        upmix_mono_to_interleaved(&[0.1, 0.2, 0.3], 2, &mut out);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn gain_ramp_is_gradual() {
        let mut ramp = GainRamp::new(1.0, 4);
        ramp.set_target(0.0);

        let mut samples = [1.0; 6];
        ramp.apply(&mut samples);
        assert_eq!(samples, [0.75, 0.5, 0.25, 0.0, 0.0, 0.0]);

        let mut samples = [1.0; 2];
        ramp.apply(&mut samples);
        assert_eq!(samples, [0.0, 0.0]);
    }

    #[test]
    fn gain_ramp_steady_state() {
        let mut ramp = GainRamp::new(0.5, 4);
        let mut samples = [1.0, -1.0];
        ramp.apply(&mut samples);
        assert_eq!(samples, [0.5, -0.5]);
    }
}
