/// Limits for the discrete token fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenTuning {
    pub min_scale: f32,
    pub max_scale: f32,
    pub default_scale: f32,
    pub min_state: i32,
    pub max_state: i32,
    pub default_state: i32,
}

impl Default for TokenTuning {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 4.0,
            default_scale: 0.8,
            min_state: 1,
            max_state: 6,
            default_state: 1,
        }
    }
}

impl TokenTuning {
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return self.default_scale;
        }
        scale.clamp(self.min_scale, self.max_scale)
    }

    pub fn clamp_state(&self, state: i32) -> i32 {
        state.clamp(self.min_state, self.max_state)
    }
}
