//! rf-core: Shared types for the ReelForge routing crates
//!
//! Identifiers, latency units and the core error type used by the
//! route graph and anything that talks to it.

mod error;
mod route;
mod sample;
mod time;

pub use error::*;
pub use route::*;
pub use sample::*;
pub use time::*;

/// Standard sample rate options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
    Hz176400 = 176400,
    Hz192000 = 192000,
    Hz352800 = 352800,
    Hz384000 = 384000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Parse a raw rate in Hz
    pub fn from_hz(hz: u32) -> RfResult<Self> {
        match hz {
            44100 => Ok(Self::Hz44100),
            48000 => Ok(Self::Hz48000),
            88200 => Ok(Self::Hz88200),
            96000 => Ok(Self::Hz96000),
            176400 => Ok(Self::Hz176400),
            192000 => Ok(Self::Hz192000),
            352800 => Ok(Self::Hz352800),
            384000 => Ok(Self::Hz384000),
            other => Err(RfError::InvalidSampleRate(other)),
        }
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Buffer size options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum BufferSize {
    Samples32 = 32,
    Samples64 = 64,
    Samples128 = 128,
    Samples256 = 256,
    Samples512 = 512,
    Samples1024 = 1024,
    Samples2048 = 2048,
    Samples4096 = 4096,
}

impl BufferSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }

    #[inline]
    pub fn as_samples(self) -> LatencySamples {
        self as u32 as LatencySamples
    }

    /// Calculate latency in milliseconds
    #[inline]
    pub fn latency_ms(self, sample_rate: SampleRate) -> f64 {
        samples_to_ms(self.as_samples(), sample_rate)
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::Samples256
    }
}
