use crate::{MIN_OUTPUT_FRAME, SampleFrame};

/// Upper bound for the carry buffer while no usable ratio is known, about 1s at 192 kHz.
const MAX_CARRY_SAMPLES: usize = 192_000;

/// Linear-interpolating sample rate converter with a carry buffer.
///
/// Input blocks of any length are accumulated until at least [`MIN_OUTPUT_FRAME`] output
/// samples' worth is buffered, then the whole carry is converted in one batch and cleared.
/// Ratio changes apply to the next [`Resampler::push`]; already buffered input is converted
/// at the ratio in effect when it is consumed.
#[derive(Debug)]
pub struct Resampler {
    carry: Vec<f32>,
    target_rate: u32,
    /// `input_rate / target_rate`. Zero while the input rate is unknown.
    ratio: f64,
    min_output_frame: usize,
}

impl Resampler {
    pub fn new(input_rate: u32, target_rate: u32) -> Self {
        Self::with_min_output_frame(input_rate, target_rate, MIN_OUTPUT_FRAME)
    }

    pub fn with_min_output_frame(input_rate: u32, target_rate: u32, min_output_frame: usize) -> Self {
        let mut resampler = Self {
            carry: Vec::with_capacity(MAX_CARRY_SAMPLES),
            target_rate,
            ratio: 0.0,
            min_output_frame: min_output_frame.max(1),
        };
        resampler.set_ratio(input_rate);
        resampler
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn buffered(&self) -> usize {
        self.carry.len()
    }

    /// Updates the ratio from a new input rate. An input rate of zero marks the rate as unknown.
    pub fn set_ratio(&mut self, input_rate: u32) {
        self.ratio = if self.target_rate == 0 {
            0.0
        } else {
            input_rate as f64 / self.target_rate as f64
        };
        tracing::trace!(input_rate, ratio = self.ratio, "Resampler ratio updated");
    }

    /// Appends `block` and returns a converted frame once enough input is buffered.
    pub fn push(&mut self, block: &[f32]) -> Option<SampleFrame> {
        let mut output = Vec::new();
        self.push_into(block, &mut output)
            .then(|| SampleFrame::new(output, self.target_rate))
    }

    /// Like [`Resampler::push`], but writes into a caller-owned buffer so the audio callback can
    /// reuse its allocation. Returns `true` if `output` was filled with a new batch.
    pub fn push_into(&mut self, block: &[f32], output: &mut Vec<f32>) -> bool {
        self.carry.extend_from_slice(block);

        if !self.ratio.is_finite() || self.ratio <= 0.0 {
            // Rate not known yet, keep the most recent input only.
            if self.carry.len() > MAX_CARRY_SAMPLES {
                let excess = self.carry.len() - MAX_CARRY_SAMPLES;
                self.carry.drain(..excess);
            }
            return false;
        }

        if (self.carry.len() as f64) < self.ratio * self.min_output_frame as f64 {
            return false;
        }

        let output_len = (self.carry.len() as f64 / self.ratio).floor() as usize;
        output.clear();
        output.reserve(output_len);
        for i in 0..output_len {
            let position = i as f64 * self.ratio;
            let index = position.floor() as usize;
            let fraction = (position - index as f64) as f32;

            let sample = match (self.carry.get(index), self.carry.get(index + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - fraction) + b * fraction,
                (Some(&a), None) => a,
                _ => break,
            };
            output.push(sample);
        }

        self.carry.clear();
        true
    }

    /// Drops buffered input without touching the ratio.
    pub fn clear(&mut self) {
        self.carry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WIRE_SAMPLE_RATE;
    use pretty_assertions::assert_eq;

    #[test]
    fn identity_at_unit_ratio() {
        let mut resampler = Resampler::new(WIRE_SAMPLE_RATE, WIRE_SAMPLE_RATE);
        let input: Vec<f32> = (0..200).map(|i| (i as f32 / 200.0) - 0.5).collect();

        let frame = resampler.push(&input).expect("enough input for a batch");
        assert_eq!(frame.samples(), &input[..]);
        assert_eq!(frame.sample_rate(), WIRE_SAMPLE_RATE);
        assert_eq!(resampler.buffered(), 0);
    }

    #[test]
    fn halving_rate() {
        let mut resampler = Resampler::new(48_000, WIRE_SAMPLE_RATE);
        assert_eq!(resampler.ratio(), 2.0);

        let input: Vec<f32> = (0..256).map(|i| i as f32 / 256.0).collect();
        let frame = resampler.push(&input).unwrap();
        assert_eq!(frame.len(), 128);
        // Even positions land exactly on input samples.
        assert_eq!(frame.samples()[1], input[2]);
        assert_eq!(frame.samples()[127], input[254]);
    }

    #[test]
    fn accumulates_below_minimum_batch() {
        let mut resampler = Resampler::new(48_000, WIRE_SAMPLE_RATE);
        assert!(resampler.push(&[0.1; 128]).is_none());
        assert_eq!(resampler.buffered(), 128);
        assert!(resampler.push(&[0.1; 127]).is_none());

        let frame = resampler.push(&[0.1; 1]).unwrap();
        assert_eq!(frame.len(), 128);
        assert_eq!(resampler.buffered(), 0);
    }

    #[test]
    fn interpolates_between_neighbours() {
        // 36 kHz -> 24 kHz, ratio 1.5
        let mut resampler = Resampler::with_min_output_frame(36_000, WIRE_SAMPLE_RATE, 2);
        let frame = resampler.push(&[0.0, 1.0, 0.0, -1.0]).unwrap();

        // positions 0.0 and 1.5
        assert_eq!(frame.samples(), &[0.0, 0.5][..]);
    }

    #[test]
    fn boundary_uses_last_sample() {
        // 12 kHz -> 24 kHz, ratio 0.5: the last two positions have no right neighbour.
        let mut resampler = Resampler::with_min_output_frame(12_000, WIRE_SAMPLE_RATE, 1);
        let frame = resampler.push(&[0.0, 0.3]).unwrap();

        assert_eq!(frame.samples(), &[0.0, 0.15, 0.3, 0.3][..]);
    }

    #[test]
    fn unknown_rate_accumulates_without_output() {
        let mut resampler = Resampler::new(0, WIRE_SAMPLE_RATE);
        assert_eq!(resampler.ratio(), 0.0);
        assert!(resampler.push(&[0.5; 4096]).is_none());
        assert_eq!(resampler.buffered(), 4096);

        resampler.set_ratio(WIRE_SAMPLE_RATE);
        let frame = resampler.push(&[]).unwrap();
        assert_eq!(frame.len(), 4096);
    }

    #[test]
    fn unknown_rate_caps_carry() {
        let mut resampler = Resampler::new(0, WIRE_SAMPLE_RATE);
        resampler.push(&vec![0.0; MAX_CARRY_SAMPLES]);
        resampler.push(&[1.0; 10]);
        assert_eq!(resampler.buffered(), MAX_CARRY_SAMPLES);
    }

    #[test]
    fn ratio_change_applies_to_next_push() {
        let mut resampler = Resampler::new(48_000, WIRE_SAMPLE_RATE);
        assert!(resampler.push(&[0.2; 200]).is_none());

        resampler.set_ratio(WIRE_SAMPLE_RATE);
        // 200 buffered + 56 new, consumed at the new ratio of 1.0
        let frame = resampler.push(&[0.2; 56]).unwrap();
        assert_eq!(frame.len(), 256);
    }
}
