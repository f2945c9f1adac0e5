use std::fmt::{Display, Formatter};

use bytes::Bytes;

/// Denominator cap used when turning a floating framerate into a rational.
const MAX_RATE_DENOMINATOR: i64 = 100_000;

/// Unit duration of a stream, as `num / den` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// One tick per video frame: the inverse of the framerate.
    pub fn from_fps(fps: f64) -> Self {
        let (num, den) = approximate_rational(fps, MAX_RATE_DENOMINATOR);
        Self::new(den as i32, num as i32)
    }

    /// One tick per audio sample.
    pub fn from_sample_rate(sample_rate: u32) -> Self {
        Self::new(1, sample_rate as i32)
    }

    pub fn invert(self) -> Self {
        Self::new(self.den, self.num)
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Rescales `value` from `self` into `to`, rounding half away from zero.
    pub fn rescale(self, value: i64, to: TimeBase) -> i64 {
        let num = value as i128 * self.num as i128 * to.den as i128;
        let den = self.den as i128 * to.num as i128;
        if den == 0 {
            return value;
        }
        let quotient = num / den;
        let remainder = num % den;
        if 2 * remainder.abs() >= den.abs() {
            (quotient + num.signum() * den.signum()) as i64
        } else {
            quotient as i64
        }
    }
}

impl Display for TimeBase {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Best rational approximation of `value` whose denominator stays within
/// `max_den`, by continued fraction expansion.
fn approximate_rational(value: f64, max_den: i64) -> (i64, i64) {
    if !value.is_finite() || value <= 0.0 {
        return (0, 1);
    }
    let (mut h0, mut h1) = (0i64, 1i64);
    let (mut k0, mut k1) = (1i64, 0i64);
    let mut x = value;
    loop {
        let a = x.floor() as i64;
        let (Some(h2), Some(k2)) = (
            a.checked_mul(h1).and_then(|v| v.checked_add(h0)),
            a.checked_mul(k1).and_then(|v| v.checked_add(k0)),
        ) else {
            break;
        };
        if k2 > max_den || h2 > i32::MAX as i64 {
            break;
        }
        (h0, h1) = (h1, h2);
        (k0, k1) = (k1, k2);
        let frac = x - a as f64;
        if frac.abs() < 1e-9 {
            break;
        }
        x = 1.0 / frac;
    }
    (h1, k1.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/// A compressed access unit coming out of an encoder.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    data: Bytes,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: i64,
    is_key: bool,
    time_base: TimeBase,
}

impl EncodedPacket {
    pub fn new(data: Bytes, pts: Option<i64>, dts: Option<i64>, time_base: TimeBase) -> Self {
        Self {
            data,
            pts,
            dts,
            duration: 0,
            is_key: false,
            time_base,
        }
    }

    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Moves every timestamp of the packet into `to`.
    pub fn rescale_ts(&mut self, to: TimeBase) {
        let from = self.time_base;
        if from == to {
            return;
        }
        self.pts = self.pts.map(|ts| from.rescale(ts, to));
        self.dts = self.dts.map(|ts| from.rescale(ts, to));
        if self.duration > 0 {
            self.duration = from.rescale(self.duration, to);
        }
        self.time_base = to;
    }

    pub fn pts_ms(&self) -> Option<i64> {
        self.pts
            .map(|pts| self.time_base.rescale(pts, TimeBase::new(1, 1000)))
    }
}

impl Display for EncodedPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "EncodedPacket size: {}, pts: {:?}, dts: {:?}, time_base: {}, is_key: {}",
            self.data.len(),
            self.pts,
            self.dts,
            self.time_base,
            self.is_key
        )
    }
}
