use crate::models::{Preset, SamplingParams};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Sampling parameters as sent by the client; absent fields keep their
/// current (or default) value.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Validate)]
pub struct SamplingForm {
    #[validate(minimum = 0.0)]
    #[validate(maximum = 2.0)]
    pub temperature: Option<f32>,
    #[validate(minimum = 1)]
    #[validate(maximum = 32768)]
    pub max_tokens: Option<u32>,
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub top_p: Option<f32>,
    #[validate(maximum = 2.0)]
    pub presence_penalty: Option<f32>,
    #[validate(maximum = 2.0)]
    pub frequency_penalty: Option<f32>,
}

pub const PENALTY_FLOOR: f32 = -2.0;

impl SamplingForm {
    /// Lower bound of both penalties; checked here since the derive only
    /// takes non-negative literals.
    pub fn check_penalties(&self) -> Result<(), String> {
        for (name, value) in [
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            match value {
                Some(v) if v < PENALTY_FLOOR || v.is_nan() => {
                    return Err(format!("{} must be at least {}", name, PENALTY_FLOOR));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn apply(&self, params: &mut SamplingParams) {
        if let Some(temperature) = self.temperature {
            params.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            params.max_tokens = max_tokens;
        }
        if let Some(top_p) = self.top_p {
            params.top_p = top_p;
        }
        if let Some(presence_penalty) = self.presence_penalty {
            params.presence_penalty = presence_penalty;
        }
        if let Some(frequency_penalty) = self.frequency_penalty {
            params.frequency_penalty = frequency_penalty;
        }
    }
}

impl From<SamplingParams> for SamplingForm {
    fn from(params: SamplingParams) -> Self {
        Self {
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
            top_p: Some(params.top_p),
            presence_penalty: Some(params.presence_penalty),
            frequency_penalty: Some(params.frequency_penalty),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct PresetForm {
    #[validate(min_length = 1)]
    #[validate(max_length = 100)]
    pub name: String,
    #[serde(default)]
    #[validate(max_length = 1000)]
    pub description: Option<String>,
    #[validate(max_length = 20000)]
    pub system_prompt: String,
    #[serde(default)]
    #[validate]
    pub parameters: Option<SamplingForm>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PresetForm {
    /// Full validation: the derived rules, the penalty floor and a name that
    /// is not only whitespace.
    pub fn check(&self) -> Result<(), String> {
        self.validate().map_err(|errors| errors.to_string())?;
        if self.name.trim().is_empty() {
            return Err("name must not be blank".to_string());
        }
        if let Some(parameters) = &self.parameters {
            parameters.check_penalties()?;
        }
        Ok(())
    }
}

impl From<PresetForm> for Preset {
    fn from(form: PresetForm) -> Self {
        let mut parameters = SamplingParams::default();
        if let Some(sampling) = &form.parameters {
            sampling.apply(&mut parameters);
        }

        Preset::new(
            form.name.trim().to_string(),
            form.description.unwrap_or_default(),
            form.system_prompt,
            parameters,
            form.is_active,
        )
    }
}

impl From<&Preset> for PresetForm {
    fn from(preset: &Preset) -> Self {
        Self {
            name: preset.name.clone(),
            description: Some(preset.description.clone()),
            system_prompt: preset.system_prompt.clone(),
            parameters: Some(preset.parameters.into()),
            is_active: preset.is_active,
        }
    }
}

/// Partial update: only supplied fields are validated and applied.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Validate)]
pub struct PresetPatch {
    #[validate(min_length = 1)]
    #[validate(max_length = 100)]
    pub name: Option<String>,
    #[validate(max_length = 1000)]
    pub description: Option<String>,
    #[validate(max_length = 20000)]
    pub system_prompt: Option<String>,
    #[validate]
    pub parameters: Option<SamplingForm>,
    pub is_active: Option<bool>,
}

impl PresetPatch {
    pub fn check(&self) -> Result<(), String> {
        self.validate().map_err(|errors| errors.to_string())?;
        if let Some(parameters) = &self.parameters {
            parameters.check_penalties()?;
        }
        Ok(())
    }

    pub fn update(self, preset: &mut Preset) {
        if let Some(name) = self.name {
            preset.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            preset.description = description;
        }
        if let Some(system_prompt) = self.system_prompt {
            preset.system_prompt = system_prompt;
        }
        if let Some(parameters) = self.parameters {
            parameters.apply(&mut preset.parameters);
        }
        if let Some(is_active) = self.is_active {
            preset.is_active = is_active;
        }
    }
}
