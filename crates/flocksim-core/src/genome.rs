//! Heritable trait record and the clamped mutation rule.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::Tick;

/// Initial draw, mutation delta and clamp range for one numeric trait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraitSpec {
    pub init_min: f32,
    pub init_max: f32,
    pub delta_min: f32,
    pub delta_max: f32,
    pub min: f32,
    pub max: f32,
}

impl TraitSpec {
    const fn new(init: (f32, f32), delta: f32, clamp: (f32, f32)) -> Self {
        Self {
            init_min: init.0,
            init_max: init.1,
            delta_min: -delta,
            delta_max: delta,
            min: clamp.0,
            max: clamp.1,
        }
    }

    fn sample(&self, rng: &mut dyn RngCore) -> f32 {
        if self.init_min == self.init_max {
            return self.init_min;
        }
        rng.random_range(self.init_min..=self.init_max)
    }

    fn perturb(&self, value: f32, rng: &mut dyn RngCore) -> f32 {
        let delta = rng.random_range(self.delta_min..=self.delta_max);
        (value + delta).clamp(self.min, self.max)
    }

    /// Whether `value` sits inside the clamp range.
    #[must_use]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const ALIGNMENT_WEIGHT: TraitSpec = TraitSpec::new((0.5, 2.0), 1.0, (0.1, 3.0));
pub const COHESION_WEIGHT: TraitSpec = TraitSpec::new((0.5, 2.0), 1.0, (0.1, 3.0));
pub const SEPARATION_WEIGHT: TraitSpec = TraitSpec::new((1.5, 3.0), 1.0, (0.1, 3.0));
pub const PERCEPTION_RADIUS: TraitSpec = TraitSpec::new((40.0, 100.0), 1.0, (20.0, 150.0));
pub const MAX_SPEED: TraitSpec = TraitSpec::new((2.0, 5.0), 1.0, (1.0, 6.0));
/// Sprite extent; every founder starts at 22x22.
pub const SIZE: TraitSpec = TraitSpec::new((22.0, 22.0), 3.0, (6.0, 256.0));

/// Founder colour channel value.
pub const COLOR_INITIAL: u8 = 255;
/// Per-channel colour drift, skewed toward darkening.
pub const COLOR_DELTA: (i16, i16) = (-50, 25);

/// Behaviour and appearance parameters owned by one boid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub separation_weight: f32,
    pub perception_radius: f32,
    pub max_speed: f32,
    pub size_w: f32,
    pub size_h: f32,
    /// RGB display colour.
    pub color: [u8; 3],
    pub birth_tick: Tick,
    /// Marked agents are removed during the next eviction stage.
    pub expired: bool,
}

impl Default for Genome {
    fn default() -> Self {
        Self {
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
            separation_weight: 2.0,
            perception_radius: 50.0,
            max_speed: 4.0,
            size_w: SIZE.init_min,
            size_h: SIZE.init_min,
            color: [COLOR_INITIAL; 3],
            birth_tick: Tick::zero(),
            expired: false,
        }
    }
}

impl Genome {
    /// Draw a founder genome uniformly from the initial ranges.
    #[must_use]
    pub fn random(rng: &mut dyn RngCore, birth_tick: Tick) -> Self {
        Self {
            alignment_weight: ALIGNMENT_WEIGHT.sample(rng),
            cohesion_weight: COHESION_WEIGHT.sample(rng),
            separation_weight: SEPARATION_WEIGHT.sample(rng),
            perception_radius: PERCEPTION_RADIUS.sample(rng),
            max_speed: MAX_SPEED.sample(rng),
            size_w: SIZE.sample(rng),
            size_h: SIZE.sample(rng),
            color: [COLOR_INITIAL; 3],
            birth_tick,
            expired: false,
        }
    }

    /// Copy this genome into an offspring, perturbing every numeric trait
    /// independently and clamping it back into range.
    #[must_use]
    pub fn mutate(&self, rng: &mut dyn RngCore, birth_tick: Tick) -> Self {
        let mut color = self.color;
        for channel in &mut color {
            let delta = rng.random_range(COLOR_DELTA.0..=COLOR_DELTA.1);
            *channel = (i16::from(*channel) + delta).clamp(0, 255) as u8;
        }
        Self {
            alignment_weight: ALIGNMENT_WEIGHT.perturb(self.alignment_weight, rng),
            cohesion_weight: COHESION_WEIGHT.perturb(self.cohesion_weight, rng),
            separation_weight: SEPARATION_WEIGHT.perturb(self.separation_weight, rng),
            perception_radius: PERCEPTION_RADIUS.perturb(self.perception_radius, rng),
            max_speed: MAX_SPEED.perturb(self.max_speed, rng),
            size_w: SIZE.perturb(self.size_w, rng),
            size_h: SIZE.perturb(self.size_h, rng),
            color,
            birth_tick,
            expired: false,
        }
    }

    /// Checks every numeric trait against its clamp range.
    #[must_use]
    pub fn is_within_bounds(&self) -> bool {
        ALIGNMENT_WEIGHT.contains(self.alignment_weight)
            && COHESION_WEIGHT.contains(self.cohesion_weight)
            && SEPARATION_WEIGHT.contains(self.separation_weight)
            && PERCEPTION_RADIUS.contains(self.perception_radius)
            && MAX_SPEED.contains(self.max_speed)
            && SIZE.contains(self.size_w)
            && SIZE.contains(self.size_h)
    }

    /// Ticks elapsed since birth.
    #[must_use]
    pub const fn age(&self, now: Tick) -> u64 {
        now.0.saturating_sub(self.birth_tick.0)
    }
}
