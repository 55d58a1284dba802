use std::sync::Arc;

use rustfft::{num_complex::Complex64, Fft, FftPlanner};

use crate::drivers::SensorError;

/// Frequency and level per FFT bin, `N / 2` entries each.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectrumResult {
    pub frequencies: Vec<f64>,
    pub levels: Vec<f64>,
    pub log_scale: bool,
}
impl SpectrumResult {
    pub fn len(&self) -> usize {
        self.levels.len()
    }
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
    /// Bin with the largest level, skipping bin 0.
    pub fn peak_bin(&self) -> Option<usize> {
        self.levels
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
    }
}

/// Magnitude spectrum of the first `N` samples of a channel, `N` being the
/// largest power of two not above the requested size.
pub struct SpectrumAnalyzer {
    size: usize,
    output_data_rate_hz: f64,
    fft: Arc<dyn Fft<f64>>,
}
impl SpectrumAnalyzer {
    pub fn new(target_size: usize, output_data_rate_hz: f64) -> Result<Self, SensorError> {
        if target_size == 0 {
            return Err(SensorError::InvalidFftSize);
        }
        if !(output_data_rate_hz > 0.0 && output_data_rate_hz.is_finite()) {
            return Err(SensorError::InvalidOutputDataRate(output_data_rate_hz));
        }
        let size = largest_power_of_two(target_size);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(size);
        Ok(Self {
            size,
            output_data_rate_hz,
            fft,
        })
    }
    /// Samples consumed per analysis.
    pub fn size(&self) -> usize {
        self.size
    }
    pub fn bins(&self) -> usize {
        self.size / 2
    }
    pub fn output_data_rate_hz(&self) -> f64 {
        self.output_data_rate_hz
    }
    /// Same transform size at a different sample rate.
    pub fn with_output_data_rate(&self, output_data_rate_hz: f64) -> Result<Self, SensorError> {
        if !(output_data_rate_hz > 0.0 && output_data_rate_hz.is_finite()) {
            return Err(SensorError::InvalidOutputDataRate(output_data_rate_hz));
        }
        Ok(Self {
            size: self.size,
            output_data_rate_hz,
            fft: Arc::clone(&self.fft),
        })
    }
    pub fn analyze(&self, samples: &[f64], log_scale: bool) -> Result<SpectrumResult, SensorError> {
        let n = self.size;
        if samples.len() < n {
            return Err(SensorError::InsufficientSamples {
                required: n,
                actual: samples.len(),
            });
        }
        let packed = self.real_transform(&samples[..n]);
        let sample_interval = 1.0 / self.output_data_rate_hz;
        let mut frequencies = Vec::with_capacity(n / 2);
        let mut levels = Vec::with_capacity(n / 2);
        for bin in 0..n / 2 {
            let magnitude = packed[2 * bin].hypot(packed[2 * bin + 1]);
            let frequency = bin as f64 / (n as f64 * sample_interval);
            if log_scale {
                levels.push(10.0 * magnitude.log10());
                frequencies.push(if bin == 0 {
                    0.0
                } else {
                    10.0 * frequency.log10() + 10.0
                });
            } else {
                levels.push(magnitude);
                frequencies.push(frequency);
            }
        }
        Ok(SpectrumResult {
            frequencies,
            levels,
            log_scale,
        })
    }
    /// Real DFT in packed layout: `[Re0, Re(N/2), Re1, Im1, Re2, Im2, ...]`.
    fn real_transform(&self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        let mut buffer: Vec<Complex64> = input.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.fft.process(&mut buffer);
        let mut packed = vec![0.0; n.max(2)];
        packed[0] = buffer[0].re;
        if n >= 2 {
            packed[1] = buffer[n / 2].re;
        }
        for k in 1..n / 2 {
            packed[2 * k] = buffer[k].re;
            packed[2 * k + 1] = -buffer[k].im;
        }
        packed
    }
}

fn largest_power_of_two(target: usize) -> usize {
    let mut size = 1usize;
    while size.checked_mul(2).is_some_and(|next| next <= target) {
        size *= 2;
    }
    size
}
