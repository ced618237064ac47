use serde::{Deserialize, Serialize};

pub const DEFAULT_STALE_WINDOW: u32 = 65536;
pub const DEFAULT_PHYSICS_TIMESTEP: f32 = 1.0 / 45.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub decoder: DecoderConfig,
    pub predictor: PredictorConfig,
}

impl ReplicationConfig {
    pub fn validated(self) -> Self {
        Self {
            decoder: self.decoder,
            predictor: self.predictor.validated(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// An incoming sequence number this far or less behind the last applied
    /// one is dropped as stale.
    pub stale_window: u32,
    pub ping_interpolate: bool,
    pub static_epsilon: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            stale_window: DEFAULT_STALE_WINDOW,
            ping_interpolate: false,
            static_epsilon: 1e-5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseOut {
    pub start_secs: f64,
    pub horizon_secs: f64,
}

impl Default for PhaseOut {
    fn default() -> Self {
        Self {
            start_secs: 1.0,
            horizon_secs: 3.0,
        }
    }
}

impl PhaseOut {
    pub fn is_valid(&self) -> bool {
        self.start_secs.is_finite()
            && self.horizon_secs.is_finite()
            && self.start_secs >= 0.0
            && self.horizon_secs > self.start_secs
    }

    /// Linear falloff from 1 at `start_secs` to 0 at `horizon_secs`.
    pub fn decay(&self, secs_since_update: f64) -> f32 {
        if secs_since_update <= self.start_secs {
            return 1.0;
        }
        let span = self.horizon_secs - self.start_secs;
        if span <= 0.0 {
            return 0.0;
        }
        ((self.horizon_secs - secs_since_update) / span).clamp(0.0, 1.0) as f32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub velocity_interpolate: bool,
    /// `None` extrapolates without bound.
    pub phase_out: Option<PhaseOut>,
    pub region_crossing_secs: f64,
    pub physics_timestep: f32,
    pub angular_epsilon: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            velocity_interpolate: true,
            phase_out: Some(PhaseOut::default()),
            region_crossing_secs: 1.0,
            physics_timestep: DEFAULT_PHYSICS_TIMESTEP,
            angular_epsilon: 1e-5,
        }
    }
}

impl PredictorConfig {
    pub fn unbounded() -> Self {
        Self {
            phase_out: None,
            ..Self::default()
        }
    }

    pub fn validated(mut self) -> Self {
        if let Some(phase_out) = self.phase_out
            && !phase_out.is_valid()
        {
            log::warn!(
                "invalid phase-out {:.3}s..{:.3}s, using defaults",
                phase_out.start_secs,
                phase_out.horizon_secs
            );
            self.phase_out = Some(PhaseOut::default());
        }
        if !self.region_crossing_secs.is_finite() || self.region_crossing_secs < 0.0 {
            log::warn!("invalid region crossing window, using default");
            self.region_crossing_secs = Self::default().region_crossing_secs;
        }
        if !self.physics_timestep.is_finite() || self.physics_timestep < 0.0 {
            self.physics_timestep = DEFAULT_PHYSICS_TIMESTEP;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_falls_linearly() {
        let phase_out = PhaseOut::default();
        assert_eq!(phase_out.decay(0.5), 1.0);
        assert_eq!(phase_out.decay(1.0), 1.0);
        assert!((phase_out.decay(2.0) - 0.5).abs() < 1e-6);
        assert_eq!(phase_out.decay(3.0), 0.0);
        assert_eq!(phase_out.decay(100.0), 0.0);
    }

    #[test]
    fn inverted_phase_out_is_reset() {
        let config = PredictorConfig {
            phase_out: Some(PhaseOut {
                start_secs: 5.0,
                horizon_secs: 2.0,
            }),
            ..PredictorConfig::default()
        }
        .validated();
        assert_eq!(config.phase_out, Some(PhaseOut::default()));
    }

    #[test]
    fn unbounded_has_no_phase_out() {
        assert_eq!(PredictorConfig::unbounded().validated().phase_out, None);
    }
}
