/// An ordered, mono sequence of samples in `[-1.0, 1.0]` tagged with its sample rate.
///
/// Frames are immutable once produced. Ownership moves from producer to consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SampleFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Hands back the sample storage so its allocation can be reused.
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl AsRef<[f32]> for SampleFrame {
    fn as_ref(&self) -> &[f32] {
        &self.samples
    }
}
