//! Engine configuration loaded from TOML.
//!
//! Every threshold the trackers, the utility engine, and the orchestrator use
//! lives here with a `default_*` function, so an empty document yields the
//! stock engine.

use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{maturity::MaturityStage, models::UtilityWeights};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Maturity tracker settings.
    #[serde(default)]
    pub maturity: MaturityConfig,
    /// Mental health monitor settings.
    #[serde(default)]
    pub mental_health: MentalHealthConfig,
    /// Utility engine settings.
    #[serde(default)]
    pub utility: UtilityConfig,
    /// Plan generation settings.
    #[serde(default)]
    pub planning: PlanningConfig,
    /// Orchestrator timeouts and scaling.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Stability signal and decoding mode thresholds.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("decoding engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.maturity.validate()?;
        self.mental_health.validate()?;
        self.utility.validate()?;
        self.planning.validate()?;
        self.orchestrator.validate()?;
        self.evaluation.validate()
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
        bail!("{name} must be within [0, 1], got {value}");
    }
    Ok(())
}

/// Per-stage values for the three stages that can still advance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdvanceSchedule {
    /// Value applied while leaving infant.
    pub infant: u64,
    /// Value applied while leaving child.
    pub child: u64,
    /// Value applied while leaving adolescent.
    pub adolescent: u64,
}

impl AdvanceSchedule {
    /// Value for the stage being left, `None` for adult.
    #[must_use]
    pub const fn for_stage(&self, stage: MaturityStage) -> Option<u64> {
        match stage {
            MaturityStage::Infant => Some(self.infant),
            MaturityStage::Child => Some(self.child),
            MaturityStage::Adolescent => Some(self.adolescent),
            MaturityStage::Adult => None,
        }
    }
}

/// Experience awarded per outcome class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperienceAwards {
    /// Successful cycle.
    #[serde(default = "default_success_xp")]
    pub success: u64,
    /// Failed cycle. Failures still teach, so this is never negative.
    #[serde(default = "default_failure_xp")]
    pub failure: u64,
    /// Bonus for a successful high-complexity cycle.
    #[serde(default = "default_complex_xp")]
    pub complex_bonus: u64,
    /// Awarded when an intervention fires.
    #[serde(default = "default_intervention_xp")]
    pub intervention: u64,
}

impl Default for ExperienceAwards {
    fn default() -> Self {
        Self {
            success: default_success_xp(),
            failure: default_failure_xp(),
            complex_bonus: default_complex_xp(),
            intervention: default_intervention_xp(),
        }
    }
}

/// Maturity tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaturityConfig {
    /// Experience per outcome class.
    #[serde(default)]
    pub experience: ExperienceAwards,
    /// Effective complexity at or above which the complex bonus applies.
    #[serde(default = "default_complex_threshold")]
    pub complex_threshold: f64,
    /// Minimum seconds spent in a stage before advancing.
    #[serde(default = "default_min_dwell_secs")]
    pub min_dwell_secs: AdvanceSchedule,
    /// Cumulative experience needed to leave a stage.
    #[serde(default = "default_experience_to_advance")]
    pub experience_to_advance: AdvanceSchedule,
    /// Emotional stability floor for progression.
    #[serde(default = "default_stability_floor")]
    pub stability_floor: f64,
    /// Burnout ceiling for progression.
    #[serde(default = "default_burnout_ceiling")]
    pub burnout_ceiling: f64,
    /// Rolling decision-quality floor for progression.
    #[serde(default = "default_quality_floor")]
    pub quality_floor: f64,
    /// Quality samples retained.
    #[serde(default = "default_quality_window")]
    pub quality_window: usize,
    /// Quality samples required before progression is considered.
    #[serde(default = "default_min_quality_samples")]
    pub min_quality_samples: usize,
    /// Stress and burnout level counted as critical.
    #[serde(default = "default_critical_level")]
    pub critical_level: f64,
    /// Consecutive critical cycles that demote a stage.
    #[serde(default = "default_regression_cycles")]
    pub regression_cycles: u32,
}

impl Default for MaturityConfig {
    fn default() -> Self {
        Self {
            experience: ExperienceAwards::default(),
            complex_threshold: default_complex_threshold(),
            min_dwell_secs: default_min_dwell_secs(),
            experience_to_advance: default_experience_to_advance(),
            stability_floor: default_stability_floor(),
            burnout_ceiling: default_burnout_ceiling(),
            quality_floor: default_quality_floor(),
            quality_window: default_quality_window(),
            min_quality_samples: default_min_quality_samples(),
            critical_level: default_critical_level(),
            regression_cycles: default_regression_cycles(),
        }
    }
}

impl MaturityConfig {
    fn validate(&self) -> Result<()> {
        unit_interval("maturity.complex_threshold", self.complex_threshold)?;
        unit_interval("maturity.stability_floor", self.stability_floor)?;
        unit_interval("maturity.burnout_ceiling", self.burnout_ceiling)?;
        unit_interval("maturity.quality_floor", self.quality_floor)?;
        unit_interval("maturity.critical_level", self.critical_level)?;
        if self.quality_window == 0 {
            bail!("maturity.quality_window must be non-zero");
        }
        if self.min_quality_samples > self.quality_window {
            bail!("maturity.min_quality_samples exceeds quality_window");
        }
        if self.regression_cycles == 0 {
            bail!("maturity.regression_cycles must be non-zero");
        }
        let xp = self.experience_to_advance;
        if !(xp.infant < xp.child && xp.child < xp.adolescent) {
            bail!("maturity.experience_to_advance must be strictly increasing");
        }
        Ok(())
    }
}

/// Magnitudes and durations of the four directive kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectiveTuning {
    /// Cycles a break-loop directive stays active.
    #[serde(default = "default_break_loop_cycles")]
    pub break_loop_cycles: u64,
    /// Extra exploratory candidates while breaking a loop.
    #[serde(default = "default_break_loop_diversity")]
    pub break_loop_diversity: usize,
    /// Supervision added while breaking a loop.
    #[serde(default = "default_break_loop_supervision")]
    pub break_loop_supervision: f64,
    /// Cycles a validation-dampening directive stays active.
    #[serde(default = "default_validation_cycles")]
    pub validation_cycles: u64,
    /// Goal weight factor for validation-seeking goals.
    #[serde(default = "default_validation_goal_factor")]
    pub validation_goal_factor: f64,
    /// Cycles a stimulation-reduction directive stays active.
    #[serde(default = "default_stimulation_cycles")]
    pub stimulation_cycles: u64,
    /// Complexity cap while reducing stimulation.
    #[serde(default = "default_stimulation_max_complexity")]
    pub stimulation_max_complexity: f64,
    /// Urgency cap while reducing stimulation.
    #[serde(default = "default_stimulation_max_urgency")]
    pub stimulation_max_urgency: f64,
    /// Risk weight multiplier while reducing stimulation.
    #[serde(default = "default_stimulation_risk_multiplier")]
    pub stimulation_risk_multiplier: f64,
    /// Planning time factor recommended while reducing stimulation.
    #[serde(default = "default_stimulation_planning_factor")]
    pub stimulation_planning_factor: f64,
    /// Cycles a burnout-relief directive stays active.
    #[serde(default = "default_burnout_cycles")]
    pub burnout_cycles: u64,
    /// Complexity cap during burnout relief.
    #[serde(default = "default_burnout_max_complexity")]
    pub burnout_max_complexity: f64,
    /// Urgency cap during burnout relief.
    #[serde(default = "default_burnout_max_urgency")]
    pub burnout_max_urgency: f64,
    /// Risk weight multiplier during burnout relief.
    #[serde(default = "default_burnout_risk_multiplier")]
    pub burnout_risk_multiplier: f64,
    /// Planning time factor recommended during burnout relief.
    #[serde(default = "default_burnout_planning_factor")]
    pub burnout_planning_factor: f64,
}

impl Default for DirectiveTuning {
    fn default() -> Self {
        Self {
            break_loop_cycles: default_break_loop_cycles(),
            break_loop_diversity: default_break_loop_diversity(),
            break_loop_supervision: default_break_loop_supervision(),
            validation_cycles: default_validation_cycles(),
            validation_goal_factor: default_validation_goal_factor(),
            stimulation_cycles: default_stimulation_cycles(),
            stimulation_max_complexity: default_stimulation_max_complexity(),
            stimulation_max_urgency: default_stimulation_max_urgency(),
            stimulation_risk_multiplier: default_stimulation_risk_multiplier(),
            stimulation_planning_factor: default_stimulation_planning_factor(),
            burnout_cycles: default_burnout_cycles(),
            burnout_max_complexity: default_burnout_max_complexity(),
            burnout_max_urgency: default_burnout_max_urgency(),
            burnout_risk_multiplier: default_burnout_risk_multiplier(),
            burnout_planning_factor: default_burnout_planning_factor(),
        }
    }
}

/// Mental health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MentalHealthConfig {
    /// EWMA smoothing factor for stress.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Complexity below which a success counts as low effort.
    #[serde(default = "default_low_effort_complexity")]
    pub low_effort_complexity: f64,
    /// Multiplier on load for the stress target of a failed cycle.
    #[serde(default = "default_failure_load_multiplier")]
    pub failure_load_multiplier: f64,
    /// Stress added on every failure.
    #[serde(default = "default_failure_stress")]
    pub failure_stress: f64,
    /// Stress at which burnout starts to accumulate.
    #[serde(default = "default_stress_high")]
    pub stress_high: f64,
    /// EWMA factor for burnout accumulation.
    #[serde(default = "default_burnout_alpha")]
    pub burnout_alpha: f64,
    /// Fractional burnout decay per calm cycle.
    #[serde(default = "default_burnout_decay")]
    pub burnout_decay: f64,
    /// Urgency and complexity both above this count as overload.
    #[serde(default = "default_overload_level")]
    pub overload_level: f64,
    /// Burnout added on an overloaded cycle.
    #[serde(default = "default_overload_burnout")]
    pub overload_burnout: f64,
    /// Excitement lost per cycle.
    #[serde(default = "default_excitement_decay")]
    pub excitement_decay: f64,
    /// Confidence above which a success raises excitement.
    #[serde(default = "default_confident_level")]
    pub confident_level: f64,
    /// Excitement gained per unit of confidence on a confident success.
    #[serde(default = "default_excitement_gain")]
    pub excitement_gain: f64,
    /// Stability gained per success.
    #[serde(default = "default_stability_gain")]
    pub stability_gain: f64,
    /// Stability lost per failure.
    #[serde(default = "default_stability_loss")]
    pub stability_loss: f64,
    /// Stress samples used for volatility.
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
    /// Standard deviation above which stress counts as volatile.
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,
    /// Stability lost while stress is volatile.
    #[serde(default = "default_volatility_penalty")]
    pub volatility_penalty: f64,
    /// Cycles of goal history compared for loops.
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,
    /// Similar prior goals that constitute a loop.
    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: u32,
    /// Token-Jaccard similarity at which goals count as repeated.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Goal classes retained for the addictive-behavior fraction.
    #[serde(default = "default_addictive_window")]
    pub addictive_window: usize,
    /// Samples required before the fraction is trusted.
    #[serde(default = "default_addictive_min_samples")]
    pub addictive_min_samples: usize,
    /// Validation-seeking fraction that raises the score.
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
    /// Score added per validation-seeking cycle above the fraction.
    #[serde(default = "default_addictive_increment")]
    pub addictive_increment: f64,
    /// Fractional score decay otherwise.
    #[serde(default = "default_addictive_decay")]
    pub addictive_decay: f64,
    /// Score that emits a validation-dampening directive.
    #[serde(default = "default_addictive_threshold")]
    pub addictive_threshold: f64,
    /// Stress that emits a stimulation-reduction directive.
    #[serde(default = "default_stress_threshold")]
    pub stress_threshold: f64,
    /// Excitement reported as the excited status.
    #[serde(default = "default_excitement_threshold")]
    pub excitement_threshold: f64,
    /// Burnout that emits a burnout-relief directive.
    #[serde(default = "default_burnout_threshold")]
    pub burnout_threshold: f64,
    /// Directive magnitudes and durations.
    #[serde(default)]
    pub directives: DirectiveTuning,
}

impl Default for MentalHealthConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            low_effort_complexity: default_low_effort_complexity(),
            failure_load_multiplier: default_failure_load_multiplier(),
            failure_stress: default_failure_stress(),
            stress_high: default_stress_high(),
            burnout_alpha: default_burnout_alpha(),
            burnout_decay: default_burnout_decay(),
            overload_level: default_overload_level(),
            overload_burnout: default_overload_burnout(),
            excitement_decay: default_excitement_decay(),
            confident_level: default_confident_level(),
            excitement_gain: default_excitement_gain(),
            stability_gain: default_stability_gain(),
            stability_loss: default_stability_loss(),
            volatility_window: default_volatility_window(),
            volatility_threshold: default_volatility_threshold(),
            volatility_penalty: default_volatility_penalty(),
            loop_window: default_loop_window(),
            loop_threshold: default_loop_threshold(),
            similarity_threshold: default_similarity_threshold(),
            addictive_window: default_addictive_window(),
            addictive_min_samples: default_addictive_min_samples(),
            validation_fraction: default_validation_fraction(),
            addictive_increment: default_addictive_increment(),
            addictive_decay: default_addictive_decay(),
            addictive_threshold: default_addictive_threshold(),
            stress_threshold: default_stress_threshold(),
            excitement_threshold: default_excitement_threshold(),
            burnout_threshold: default_burnout_threshold(),
            directives: DirectiveTuning::default(),
        }
    }
}

impl MentalHealthConfig {
    fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            bail!("mental_health.alpha must be within (0, 1]");
        }
        if !(self.burnout_alpha > 0.0 && self.burnout_alpha <= 1.0) {
            bail!("mental_health.burnout_alpha must be within (0, 1]");
        }
        for (name, value) in [
            ("mental_health.similarity_threshold", self.similarity_threshold),
            ("mental_health.validation_fraction", self.validation_fraction),
            ("mental_health.stress_threshold", self.stress_threshold),
            ("mental_health.burnout_threshold", self.burnout_threshold),
            ("mental_health.addictive_threshold", self.addictive_threshold),
            ("mental_health.stress_high", self.stress_high),
            ("mental_health.overload_level", self.overload_level),
            ("mental_health.confident_level", self.confident_level),
            ("mental_health.excitement_gain", self.excitement_gain),
        ] {
            unit_interval(name, value)?;
        }
        if !(self.failure_load_multiplier.is_finite() && self.failure_load_multiplier >= 1.0) {
            bail!("mental_health.failure_load_multiplier must be at least 1");
        }
        if self.loop_window == 0 || self.addictive_window == 0 || self.volatility_window == 0 {
            bail!("mental_health windows must be non-zero");
        }
        if self.loop_threshold == 0 {
            bail!("mental_health.loop_threshold must be non-zero");
        }
        let tuning = &self.directives;
        if tuning.break_loop_cycles == 0
            || tuning.validation_cycles == 0
            || tuning.stimulation_cycles == 0
            || tuning.burnout_cycles == 0
        {
            bail!("directive durations must be at least one cycle");
        }
        if tuning.stimulation_risk_multiplier < 1.0 || tuning.burnout_risk_multiplier < 1.0 {
            bail!("directive risk multipliers must not relax risk weighting");
        }
        Ok(())
    }
}

/// Goal and risk multipliers applied for one stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StageFactors {
    /// Goal weight multiplier.
    pub goal: f64,
    /// Risk weight multiplier.
    pub risk: f64,
}

/// Stage modulation of utility weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StageModulation {
    /// Infant factors.
    pub infant: StageFactors,
    /// Child factors.
    pub child: StageFactors,
    /// Adolescent factors.
    pub adolescent: StageFactors,
    /// Adult factors.
    pub adult: StageFactors,
}

impl StageModulation {
    /// Factors for the given stage.
    #[must_use]
    pub const fn for_stage(&self, stage: MaturityStage) -> StageFactors {
        match stage {
            MaturityStage::Infant => self.infant,
            MaturityStage::Child => self.child,
            MaturityStage::Adolescent => self.adolescent,
            MaturityStage::Adult => self.adult,
        }
    }
}

/// Signed coefficients mapping personality traits onto weight multipliers.
///
/// Each multiplier is `1 + coefficient * (trait - 0.5)`, floored at
/// [`UtilityConfig::min_multiplier`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PersonalityCoefficients {
    /// Creativity effect on the goal weight.
    pub creativity_goal: f64,
    /// Sociability effect on the goal weight.
    pub social_goal: f64,
    /// Analytical effect on the quality weight.
    pub analytical_quality: f64,
    /// Assertiveness effect on the risk weight.
    pub assertiveness_risk: f64,
    /// Patience effect on the cost weight.
    pub patience_cost: f64,
}

/// Utility engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UtilityConfig {
    /// Weights before modulation.
    #[serde(default = "default_base_weights")]
    pub base_weights: UtilityWeights,
    /// Sum every modulated weight vector is renormalized to.
    #[serde(default = "default_weight_total")]
    pub weight_total: f64,
    /// Cost that maps to a normalized cost of 1.
    #[serde(default = "default_cost_scale")]
    pub cost_scale: f64,
    /// Floor applied to each personality multiplier.
    #[serde(default = "default_min_multiplier")]
    pub min_multiplier: f64,
    /// Stage modulation.
    #[serde(default = "default_stage_modulation")]
    pub stage_modulation: StageModulation,
    /// Personality modulation.
    #[serde(default = "default_personality_coefficients")]
    pub personality: PersonalityCoefficients,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            base_weights: default_base_weights(),
            weight_total: default_weight_total(),
            cost_scale: default_cost_scale(),
            min_multiplier: default_min_multiplier(),
            stage_modulation: default_stage_modulation(),
            personality: default_personality_coefficients(),
        }
    }
}

impl UtilityConfig {
    fn validate(&self) -> Result<()> {
        let base = self.base_weights;
        if [base.goal, base.quality, base.risk, base.cost]
            .iter()
            .any(|weight| !(weight.is_finite() && *weight > 0.0))
        {
            bail!("utility.base_weights must all be positive");
        }
        if !(self.weight_total.is_finite() && self.weight_total > 0.0) {
            bail!("utility.weight_total must be positive");
        }
        if !(self.cost_scale.is_finite() && self.cost_scale > 0.0) {
            bail!("utility.cost_scale must be positive");
        }
        if !(self.min_multiplier > 0.0 && self.min_multiplier <= 1.0) {
            bail!("utility.min_multiplier must be within (0, 1]");
        }
        for stage in MaturityStage::ALL {
            let factors = self.stage_modulation.for_stage(stage);
            if !(factors.goal > 0.0 && factors.risk > 0.0) {
                bail!("utility.stage_modulation.{stage} factors must be positive");
            }
        }
        let coefficients = self.personality;
        if [
            coefficients.creativity_goal,
            coefficients.social_goal,
            coefficients.analytical_quality,
            coefficients.assertiveness_risk,
            coefficients.patience_cost,
        ]
        .iter()
        .any(|value| !value.is_finite())
        {
            bail!("utility.personality coefficients must be finite");
        }
        Ok(())
    }
}

/// Plan generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningConfig {
    /// Non-fallback candidates kept after filtering.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Cost of one step at zero complexity.
    #[serde(default = "default_unit_cost")]
    pub unit_cost: u64,
    /// Steps allowed per unit of stage max complexity.
    #[serde(default = "default_steps_per_complexity")]
    pub steps_per_complexity: f64,
    /// Upper bound on fallback risk.
    #[serde(default = "default_safe_risk_ceiling")]
    pub safe_risk_ceiling: f64,
    /// Risk estimate of the fallback plan.
    #[serde(default = "default_fallback_risk")]
    pub fallback_risk: f64,
    /// Quality estimate of the fallback plan.
    #[serde(default = "default_fallback_quality")]
    pub fallback_quality: f64,
    /// Goal-satisfaction estimate of the fallback plan.
    #[serde(default = "default_fallback_goal_satisfaction")]
    pub fallback_goal_satisfaction: f64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            unit_cost: default_unit_cost(),
            steps_per_complexity: default_steps_per_complexity(),
            safe_risk_ceiling: default_safe_risk_ceiling(),
            fallback_risk: default_fallback_risk(),
            fallback_quality: default_fallback_quality(),
            fallback_goal_satisfaction: default_fallback_goal_satisfaction(),
        }
    }
}

impl PlanningConfig {
    fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 {
            bail!("planning.max_candidates must be non-zero");
        }
        if !(self.steps_per_complexity.is_finite() && self.steps_per_complexity >= 1.0) {
            bail!("planning.steps_per_complexity must be at least 1");
        }
        unit_interval("planning.safe_risk_ceiling", self.safe_risk_ceiling)?;
        unit_interval("planning.fallback_risk", self.fallback_risk)?;
        unit_interval("planning.fallback_quality", self.fallback_quality)?;
        unit_interval(
            "planning.fallback_goal_satisfaction",
            self.fallback_goal_satisfaction,
        )?;
        Ok(())
    }
}

/// Orchestrator timeouts and scaling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound on a policy gate call.
    #[serde(default = "default_policy_timeout_ms")]
    pub policy_timeout_ms: u64,
    /// Upper bound on a trace sink call.
    #[serde(default = "default_trace_timeout_ms")]
    pub trace_timeout_ms: u64,
    /// Upper bound on a state store call.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Confidence multiplier applied when the fallback is used.
    #[serde(default = "default_fallback_confidence_factor")]
    pub fallback_confidence_factor: f64,
    /// Extra attempts for state reads and compare-and-swap writes.
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            policy_timeout_ms: default_policy_timeout_ms(),
            trace_timeout_ms: default_trace_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            fallback_confidence_factor: default_fallback_confidence_factor(),
            store_retries: default_store_retries(),
        }
    }
}

impl OrchestratorConfig {
    /// Policy gate timeout.
    #[must_use]
    pub const fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    /// Trace sink timeout.
    #[must_use]
    pub const fn trace_timeout(&self) -> Duration {
        Duration::from_millis(self.trace_timeout_ms)
    }

    /// State store timeout.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.policy_timeout_ms == 0 || self.trace_timeout_ms == 0 || self.store_timeout_ms == 0 {
            bail!("orchestrator timeouts must be non-zero");
        }
        unit_interval(
            "orchestrator.fallback_confidence_factor",
            self.fallback_confidence_factor,
        )
    }
}

/// Thresholds and increments behind the stability signal and decoding mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationConfig {
    /// Complexity above which the signal rises.
    #[serde(default = "default_high_level")]
    pub high_complexity: f64,
    /// Signal added for high complexity.
    #[serde(default = "default_complexity_signal")]
    pub complexity_signal: f64,
    /// Urgency above which the signal rises.
    #[serde(default = "default_high_level")]
    pub high_urgency: f64,
    /// Signal added for high urgency.
    #[serde(default = "default_urgency_signal")]
    pub urgency_signal: f64,
    /// Signal added while the agent is not stable.
    #[serde(default = "default_unsettled_signal")]
    pub unsettled_signal: f64,
    /// Stress above which the signal rises.
    #[serde(default = "default_stressed_level")]
    pub stressed_level: f64,
    /// Signal added for high stress.
    #[serde(default = "default_stress_signal")]
    pub stress_signal: f64,
    /// Emotional stability below which the signal rises.
    #[serde(default = "default_stability_level")]
    pub stability_level: f64,
    /// Signal added for low stability.
    #[serde(default = "default_instability_signal")]
    pub instability_signal: f64,
    /// Urgency above which the cycle runs in crisis mode.
    #[serde(default = "default_crisis_urgency")]
    pub crisis_urgency: f64,
    /// Signal above which the cycle runs in crisis mode.
    #[serde(default = "default_crisis_signal")]
    pub crisis_signal: f64,
    /// Complexity above which the cycle deliberates.
    #[serde(default = "default_deep_complexity")]
    pub deep_complexity: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            high_complexity: default_high_level(),
            complexity_signal: default_complexity_signal(),
            high_urgency: default_high_level(),
            urgency_signal: default_urgency_signal(),
            unsettled_signal: default_unsettled_signal(),
            stressed_level: default_stressed_level(),
            stress_signal: default_stress_signal(),
            stability_level: default_stability_level(),
            instability_signal: default_instability_signal(),
            crisis_urgency: default_crisis_urgency(),
            crisis_signal: default_crisis_signal(),
            deep_complexity: default_deep_complexity(),
        }
    }
}

impl EvaluationConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("evaluation.high_complexity", self.high_complexity),
            ("evaluation.complexity_signal", self.complexity_signal),
            ("evaluation.high_urgency", self.high_urgency),
            ("evaluation.urgency_signal", self.urgency_signal),
            ("evaluation.unsettled_signal", self.unsettled_signal),
            ("evaluation.stressed_level", self.stressed_level),
            ("evaluation.stress_signal", self.stress_signal),
            ("evaluation.stability_level", self.stability_level),
            ("evaluation.instability_signal", self.instability_signal),
            ("evaluation.crisis_urgency", self.crisis_urgency),
            ("evaluation.crisis_signal", self.crisis_signal),
            ("evaluation.deep_complexity", self.deep_complexity),
        ] {
            unit_interval(name, value)?;
        }
        Ok(())
    }
}

const fn default_success_xp() -> u64 {
    10
}

const fn default_failure_xp() -> u64 {
    5
}

const fn default_complex_xp() -> u64 {
    15
}

const fn default_intervention_xp() -> u64 {
    3
}

const fn default_complex_threshold() -> f64 {
    0.7
}

const fn default_min_dwell_secs() -> AdvanceSchedule {
    AdvanceSchedule {
        infant: 3_600,
        child: 86_400,
        adolescent: 604_800,
    }
}

const fn default_experience_to_advance() -> AdvanceSchedule {
    AdvanceSchedule {
        infant: 600,
        child: 1_800,
        adolescent: 3_600,
    }
}

const fn default_stability_floor() -> f64 {
    0.6
}

const fn default_burnout_ceiling() -> f64 {
    0.5
}

const fn default_quality_floor() -> f64 {
    0.6
}

const fn default_quality_window() -> usize {
    20
}

const fn default_min_quality_samples() -> usize {
    5
}

const fn default_critical_level() -> f64 {
    1.0
}

const fn default_regression_cycles() -> u32 {
    5
}

const fn default_break_loop_cycles() -> u64 {
    3
}

const fn default_break_loop_diversity() -> usize {
    2
}

const fn default_break_loop_supervision() -> f64 {
    0.2
}

const fn default_validation_cycles() -> u64 {
    5
}

const fn default_validation_goal_factor() -> f64 {
    0.5
}

const fn default_stimulation_cycles() -> u64 {
    5
}

const fn default_stimulation_max_complexity() -> f64 {
    0.5
}

const fn default_stimulation_max_urgency() -> f64 {
    0.6
}

const fn default_stimulation_risk_multiplier() -> f64 {
    1.5
}

const fn default_stimulation_planning_factor() -> f64 {
    1.5
}

const fn default_burnout_cycles() -> u64 {
    10
}

const fn default_burnout_max_complexity() -> f64 {
    0.3
}

const fn default_burnout_max_urgency() -> f64 {
    0.4
}

const fn default_burnout_risk_multiplier() -> f64 {
    1.3
}

const fn default_burnout_planning_factor() -> f64 {
    2.0
}

const fn default_alpha() -> f64 {
    0.3
}

const fn default_low_effort_complexity() -> f64 {
    0.3
}

const fn default_failure_stress() -> f64 {
    0.1
}

const fn default_stress_high() -> f64 {
    0.7
}

const fn default_burnout_alpha() -> f64 {
    0.1
}

const fn default_burnout_decay() -> f64 {
    0.02
}

const fn default_overload_burnout() -> f64 {
    0.05
}

const fn default_excitement_decay() -> f64 {
    0.05
}

const fn default_stability_gain() -> f64 {
    0.02
}

const fn default_stability_loss() -> f64 {
    0.03
}

const fn default_volatility_window() -> usize {
    20
}

const fn default_volatility_threshold() -> f64 {
    0.3
}

const fn default_volatility_penalty() -> f64 {
    0.05
}

const fn default_loop_window() -> usize {
    8
}

const fn default_loop_threshold() -> u32 {
    5
}

const fn default_similarity_threshold() -> f64 {
    0.8
}

const fn default_addictive_window() -> usize {
    20
}

const fn default_addictive_min_samples() -> usize {
    5
}

const fn default_validation_fraction() -> f64 {
    0.3
}

const fn default_addictive_increment() -> f64 {
    0.1
}

const fn default_addictive_decay() -> f64 {
    0.05
}

const fn default_addictive_threshold() -> f64 {
    0.6
}

const fn default_stress_threshold() -> f64 {
    0.7
}

const fn default_excitement_threshold() -> f64 {
    0.8
}

const fn default_burnout_threshold() -> f64 {
    0.8
}

const fn default_base_weights() -> UtilityWeights {
    UtilityWeights {
        goal: 0.4,
        quality: 0.3,
        risk: 0.2,
        cost: 0.1,
    }
}

const fn default_weight_total() -> f64 {
    1.0
}

const fn default_cost_scale() -> f64 {
    100.0
}

const fn default_min_multiplier() -> f64 {
    0.05
}

const fn default_stage_modulation() -> StageModulation {
    StageModulation {
        infant: StageFactors {
            goal: 0.8,
            risk: 1.5,
        },
        child: StageFactors {
            goal: 0.9,
            risk: 1.25,
        },
        adolescent: StageFactors {
            goal: 1.0,
            risk: 1.1,
        },
        adult: StageFactors {
            goal: 1.0,
            risk: 1.0,
        },
    }
}

const fn default_max_candidates() -> usize {
    6
}

const fn default_unit_cost() -> u64 {
    12
}

const fn default_steps_per_complexity() -> f64 {
    8.0
}

const fn default_safe_risk_ceiling() -> f64 {
    0.05
}

const fn default_fallback_risk() -> f64 {
    0.02
}

const fn default_fallback_quality() -> f64 {
    0.35
}

const fn default_fallback_goal_satisfaction() -> f64 {
    0.2
}

const fn default_policy_timeout_ms() -> u64 {
    2_000
}

const fn default_trace_timeout_ms() -> u64 {
    1_000
}

const fn default_store_timeout_ms() -> u64 {
    1_000
}

const fn default_fallback_confidence_factor() -> f64 {
    0.5
}

const fn default_store_retries() -> u32 {
    1
}

const fn default_failure_load_multiplier() -> f64 {
    1.5
}

const fn default_overload_level() -> f64 {
    0.8
}

const fn default_confident_level() -> f64 {
    0.8
}

const fn default_excitement_gain() -> f64 {
    0.1
}

const fn default_personality_coefficients() -> PersonalityCoefficients {
    PersonalityCoefficients {
        creativity_goal: 0.2,
        social_goal: 0.1,
        analytical_quality: 0.4,
        assertiveness_risk: -0.4,
        patience_cost: -0.3,
    }
}

const fn default_high_level() -> f64 {
    0.8
}

const fn default_complexity_signal() -> f64 {
    0.3
}

const fn default_urgency_signal() -> f64 {
    0.2
}

const fn default_unsettled_signal() -> f64 {
    0.2
}

const fn default_stressed_level() -> f64 {
    0.7
}

const fn default_stress_signal() -> f64 {
    0.15
}

const fn default_stability_level() -> f64 {
    0.5
}

const fn default_instability_signal() -> f64 {
    0.1
}

const fn default_crisis_urgency() -> f64 {
    0.9
}

const fn default_crisis_signal() -> f64 {
    0.8
}

const fn default_deep_complexity() -> f64 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.maturity.experience.success, 10);
        assert!((config.planning.safe_risk_ceiling - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [mental_health]
            loop_threshold = 3

            [mental_health.directives]
            break_loop_cycles = 4

            [utility]
            cost_scale = 250.0
            "#,
        )
        .unwrap();
        assert_eq!(config.mental_health.loop_threshold, 3);
        assert_eq!(config.mental_health.directives.break_loop_cycles, 4);
        assert_eq!(config.mental_health.directives.burnout_cycles, 10);
        assert!((config.utility.cost_scale - 250.0).abs() < f64::EPSILON);
        assert_eq!(config.maturity, MaturityConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(EngineConfig::from_toml_str("[utility]\nweight_total = 0.0").is_err());
        assert!(EngineConfig::from_toml_str("[planning]\nsafe_risk_ceiling = 1.5").is_err());
        assert!(EngineConfig::from_toml_str(
            "[maturity.experience_to_advance]\ninfant = 900\nchild = 800\nadolescent = 3600"
        )
        .is_err());
        assert!(EngineConfig::from_toml_str("[mental_health]\nloop_window = 0").is_err());
        assert!(EngineConfig::from_toml_str("[evaluation]\ncrisis_signal = 1.2").is_err());
        assert!(
            EngineConfig::from_toml_str("[mental_health]\nfailure_load_multiplier = 0.5").is_err()
        );
    }

    #[test]
    fn tuning_constants_are_overridable() {
        let config = EngineConfig::from_toml_str(
            r#"
            [evaluation]
            crisis_urgency = 0.95
            stress_signal = 0.25

            [mental_health]
            overload_level = 0.9
            excitement_gain = 0.2

            [utility.personality]
            creativity_goal = 0.3
            social_goal = 0.1
            analytical_quality = 0.5
            assertiveness_risk = -0.2
            patience_cost = -0.1
            "#,
        )
        .unwrap();
        assert!((config.evaluation.crisis_urgency - 0.95).abs() < f64::EPSILON);
        assert!((config.evaluation.stress_signal - 0.25).abs() < f64::EPSILON);
        assert!((config.evaluation.deep_complexity - 0.7).abs() < f64::EPSILON);
        assert!((config.mental_health.overload_level - 0.9).abs() < f64::EPSILON);
        assert!((config.mental_health.confident_level - 0.8).abs() < f64::EPSILON);
        assert!((config.utility.personality.analytical_quality - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.utility.stage_modulation, default_stage_modulation());
    }

    #[test]
    fn loads_from_file_with_context() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[orchestrator]\npolicy_timeout_ms = 50\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.orchestrator.policy_timeout(), Duration::from_millis(50));

        let missing = EngineConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(format!("{missing:#}").contains("reading engine config"));
    }
}
