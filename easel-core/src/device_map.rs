use std::fmt;

use candle_core::DType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceMap {
    ForceCpu,
    Ordinal(usize),
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::Ordinal(0)
    }
}

impl fmt::Display for DeviceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForceCpu => write!(f, "cpu"),
            Self::Ordinal(ordinal) => write!(f, "accelerator:{ordinal}"),
        }
    }
}

/// Weight precision used when building the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    /// fp16 weight files, F16 activations.
    Half,
    /// fp32 weight files, F32 activations.
    Full,
}

impl Precision {
    pub fn dtype(&self) -> DType {
        match self {
            Self::Half => DType::F16,
            Self::Full => DType::F32,
        }
    }

    pub fn is_half(&self) -> bool {
        matches!(self, Self::Half)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Half => write!(f, "fp16"),
            Self::Full => write!(f, "fp32"),
        }
    }
}

/// One construction attempt: where the pipeline goes and at which precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub device_map: DeviceMap,
    pub precision: Precision,
}

impl Placement {
    pub fn accelerator(ordinal: usize) -> Self {
        Self {
            device_map: DeviceMap::Ordinal(ordinal),
            precision: Precision::Half,
        }
    }

    pub fn cpu() -> Self {
        Self {
            device_map: DeviceMap::ForceCpu,
            precision: Precision::Full,
        }
    }

    /// Accelerator at half precision first, full precision on the CPU second.
    /// With `cpu_only` the accelerator attempt is skipped.
    pub fn fallback_chain(cpu_only: bool, ordinal: usize) -> Vec<Self> {
        if cpu_only {
            vec![Self::cpu()]
        } else {
            vec![Self::accelerator(ordinal), Self::cpu()]
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_map, self.precision)
    }
}
