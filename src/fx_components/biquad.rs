// src/fx_components/biquad.rs

//! Second-order filter sections (RBJ cookbook) and the three-band EQ built from them.

use crate::fx::{EqParams, FxParam};
use crate::fx_components::smoothing::SmoothedParam;
use crate::fx_components::DspComponent;
use std::f32::consts::PI;

pub const EQ_LOW_SHELF_HZ: f32 = 300.0;
pub const EQ_MID_PEAK_HZ: f32 = 1000.0;
pub const EQ_MID_Q: f32 = 1.0;
pub const EQ_HIGH_SHELF_HZ: f32 = 3000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    LowShelf,
    Peaking,
    HighShelf,
    AllPass,
}

/// Transposed direct form II biquad.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: BiquadKind,
    sample_rate: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(kind: BiquadKind, sample_rate: f32) -> Self {
        Self {
            kind,
            sample_rate,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Recomputes the coefficients. `gain_db` is ignored by the all-pass; shelves use a
    /// slope of 1.
    pub fn set(&mut self, freq_hz: f32, q: f32, gain_db: f32) {
        let freq = freq_hz.clamp(10.0, self.sample_rate * 0.49);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let a = 10.0_f32.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            BiquadKind::Peaking => {
                let alpha = sin_w0 / (2.0 * q.max(1e-3));
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            BiquadKind::AllPass => {
                let alpha = sin_w0 / (2.0 * q.max(1e-3));
                (
                    1.0 - alpha,
                    -2.0 * cos_w0,
                    1.0 + alpha,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
            BiquadKind::LowShelf => {
                let alpha = sin_w0 / 2.0 * 2.0_f32.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - k),
                    (a + 1.0) + (a - 1.0) * cos_w0 + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - k,
                )
            }
            BiquadKind::HighShelf => {
                let alpha = sin_w0 / 2.0 * 2.0_f32.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - k),
                    (a + 1.0) - (a - 1.0) * cos_w0 + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - k,
                )
            }
        };
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.z1;
        self.z1 = (self.b1 * input - self.a1 * output + self.z2).clamp(-1e6, 1e6);
        self.z2 = (self.b2 * input - self.a2 * output).clamp(-1e6, 1e6);
        output
    }
}

/// Low shelf, mid peak and high shelf in series.
#[derive(Debug, Clone)]
pub struct ThreeBandEq {
    bands: [Biquad; 3],
    gains: [SmoothedParam; 3],
    sample_rate: f32,
}

impl ThreeBandEq {
    pub fn new(sample_rate: f32, params: &EqParams) -> Self {
        let mut eq = Self {
            bands: [
                Biquad::new(BiquadKind::LowShelf, sample_rate),
                Biquad::new(BiquadKind::Peaking, sample_rate),
                Biquad::new(BiquadKind::HighShelf, sample_rate),
            ],
            gains: [
                SmoothedParam::new(params.low),
                SmoothedParam::new(params.mid),
                SmoothedParam::new(params.high),
            ],
            sample_rate,
        };
        eq.update_coefficients();
        eq
    }

    fn update_coefficients(&mut self) {
        let [low, mid, high] = &mut self.bands;
        low.set(EQ_LOW_SHELF_HZ, 0.707, self.gains[0].value());
        mid.set(EQ_MID_PEAK_HZ, EQ_MID_Q, self.gains[1].value());
        high.set(EQ_HIGH_SHELF_HZ, 0.707, self.gains[2].value());
    }
}

impl DspComponent for ThreeBandEq {
    fn ramp_param(&mut self, param: FxParam, target: f32, time_constant: f64) {
        let band = match param {
            FxParam::EqLow => 0,
            FxParam::EqMid => 1,
            FxParam::EqHigh => 2,
            _ => return,
        };
        self.gains[band].set_target(target, time_constant, self.sample_rate);
    }

    #[inline]
    fn process_audio(&mut self, input: f32) -> f32 {
        if !self.gains.iter().all(SmoothedParam::is_settled) {
            for g in self.gains.iter_mut() {
                g.next();
            }
            self.update_coefficients();
        }
        self.bands.iter_mut().fold(input, |acc, band| band.process(acc))
    }
}
