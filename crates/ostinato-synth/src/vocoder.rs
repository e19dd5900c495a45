//! Phase-vocoder time-stretcher backing the stretch effect.
//!
//! STFT analysis/synthesis with phase accumulation: input is windowed and
//! transformed, instantaneous frequencies are recovered from the phase
//! deltas, scaled for pitch, re-accumulated at the synthesis hop and
//! overlap-added back. The tempo rate moves the synthesis hop against the
//! fixed analysis hop.
//!
//! All buffers are allocated in `new`; `put_samples` and
//! `receive_samples` never allocate.

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

const FFT_SIZE: usize = 1024;
const HOP: usize = FFT_SIZE / 4;
const NUM_BINS: usize = FFT_SIZE / 2 + 1;

const INPUT_FIFO_LEN: usize = FFT_SIZE * 4;
const OUTPUT_FIFO_LEN: usize = FFT_SIZE * 32;

// Hann analysis times Hann synthesis at 75% overlap sums to 1.5.
const OVERLAP_GAIN: f32 = 1.5;

/// Streaming mono time-stretcher and pitch-shifter.
pub struct TimeStretcher {
    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,

    window: Vec<f32>,
    fft_buffer: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    time_buffer: Vec<f32>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,

    phase_accumulator: Vec<f32>,
    last_phase: Vec<f32>,
    expected_phase_diff: Vec<f32>,

    input_fifo: Vec<f32>,
    output_fifo: Vec<f32>,
    input_write: usize,
    input_read: usize,
    output_write: usize,
    output_read: usize,

    tempo: f32,
    pitch: f32,
}

impl TimeStretcher {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let ifft = planner.plan_fft_inverse(FFT_SIZE);

        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FFT_SIZE as f32).cos()))
            .collect();
        let expected_phase_diff: Vec<f32> = (0..NUM_BINS)
            .map(|k| 2.0 * PI * k as f32 * HOP as f32 / FFT_SIZE as f32)
            .collect();

        let fft_scratch = vec![Complex::new(0.0, 0.0); fft.get_scratch_len()];
        let ifft_scratch = vec![Complex::new(0.0, 0.0); ifft.get_scratch_len()];

        Self {
            fft,
            ifft,
            window,
            fft_buffer: vec![0.0; FFT_SIZE],
            spectrum: vec![Complex::new(0.0, 0.0); NUM_BINS],
            time_buffer: vec![0.0; FFT_SIZE],
            fft_scratch,
            ifft_scratch,
            phase_accumulator: vec![0.0; NUM_BINS],
            last_phase: vec![0.0; NUM_BINS],
            expected_phase_diff,
            input_fifo: vec![0.0; INPUT_FIFO_LEN],
            output_fifo: vec![0.0; OUTPUT_FIFO_LEN],
            input_write: 0,
            input_read: 0,
            output_write: 0,
            output_read: 0,
            tempo: 1.0,
            pitch: 1.0,
        }
    }

    /// Set the tempo rate (output runs `tempo` times faster than input)
    /// and the pitch ratio.
    pub fn set_rates(&mut self, tempo: f32, pitch: f32) {
        self.tempo = tempo.clamp(0.25, 2.5);
        self.pitch = pitch.clamp(0.25, 2.5);
    }

    /// No input buffered and no output pending.
    pub fn is_empty(&self) -> bool {
        self.input_available() == 0 && self.output_available() == 0
    }

    #[inline]
    pub fn input_available(&self) -> usize {
        self.input_write - self.input_read
    }

    #[inline]
    pub fn output_available(&self) -> usize {
        self.output_write - self.output_read
    }

    pub fn reset(&mut self) {
        self.fft_buffer.fill(0.0);
        self.time_buffer.fill(0.0);
        self.phase_accumulator.fill(0.0);
        self.last_phase.fill(0.0);
        self.input_fifo.fill(0.0);
        self.output_fifo.fill(0.0);
        self.input_write = 0;
        self.input_read = 0;
        self.output_write = 0;
        self.output_read = 0;
    }

    /// Feed input samples, processing every complete analysis frame.
    /// Input beyond the FIFO capacity is processed in chunks so no
    /// unconsumed sample is ever overwritten.
    pub fn put_samples(&mut self, samples: &[f32]) {
        let synthesis_hop = ((HOP as f32 / self.tempo).round() as usize).max(1);

        let mut remaining = samples;
        while !remaining.is_empty() {
            let chunk = remaining
                .len()
                .min(INPUT_FIFO_LEN - self.input_available());
            for &sample in &remaining[..chunk] {
                self.input_fifo[self.input_write % INPUT_FIFO_LEN] = sample;
                self.input_write += 1;
            }
            remaining = &remaining[chunk..];

            while self.input_available() >= FFT_SIZE {
                self.process_frame(synthesis_hop);
            }
        }
    }

    /// Pop processed output, returning how many samples were written.
    pub fn receive_samples(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.output_available());
        for (i, sample) in out.iter_mut().take(count).enumerate() {
            *sample = self.output_fifo[(self.output_read + i) % OUTPUT_FIFO_LEN];
        }
        self.output_read += count;
        count
    }

    fn process_frame(&mut self, synthesis_hop: usize) {
        for i in 0..FFT_SIZE {
            let sample = self.input_fifo[(self.input_read + i) % INPUT_FIFO_LEN];
            self.fft_buffer[i] = sample * self.window[i];
        }
        self.input_read += HOP;

        let _ = self.fft.process_with_scratch(
            &mut self.fft_buffer,
            &mut self.spectrum,
            &mut self.fft_scratch,
        );

        // recover instantaneous frequency per bin, scale for pitch,
        // re-accumulate at the synthesis hop
        let hop_ratio = synthesis_hop as f32 / HOP as f32;
        for k in 0..NUM_BINS {
            let magnitude = self.spectrum[k].norm();
            let phase = self.spectrum[k].arg();

            let expected = self.expected_phase_diff[k];
            let deviation = wrap_phase(phase - self.last_phase[k] - expected);
            let true_freq = expected + deviation;

            self.phase_accumulator[k] =
                wrap_phase(self.phase_accumulator[k] + true_freq * self.pitch * hop_ratio);
            self.last_phase[k] = phase;

            self.spectrum[k] = Complex::from_polar(magnitude, self.phase_accumulator[k]);
        }
        // the inverse transform requires purely real DC and Nyquist bins
        self.spectrum[0].im = 0.0;
        self.spectrum[NUM_BINS - 1].im = 0.0;

        let _ = self.ifft.process_with_scratch(
            &mut self.spectrum,
            &mut self.time_buffer,
            &mut self.ifft_scratch,
        );

        let scale = 1.0 / (FFT_SIZE as f32 * OVERLAP_GAIN);
        for i in 0..FFT_SIZE {
            let sample = self.time_buffer[i] * scale * self.window[i];
            self.output_fifo[(self.output_write + i) % OUTPUT_FIFO_LEN] += sample;
        }

        // the overlap region ahead of the next frame must start zeroed
        for i in 0..synthesis_hop {
            self.output_fifo[(self.output_write + FFT_SIZE + i) % OUTPUT_FIFO_LEN] = 0.0;
        }
        self.output_write += synthesis_hop;
    }
}

impl Default for TimeStretcher {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let mut p = phase;
    while p > PI {
        p -= 2.0 * PI;
    }
    while p < -PI {
        p += 2.0 * PI;
    }
    p
}
