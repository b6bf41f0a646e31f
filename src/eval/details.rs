use crate::eval::evaluator::EvalResult;
use crate::{ClientError, PercentageOption, TargetingRule, User, Value};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of evaluating a single setting.
///
/// On failure `value` holds the default value, `is_default_value` is set and `error`
/// describes what went wrong.
#[derive(Default, Debug, Clone)]
pub struct EvaluationDetails<T> {
    /// The evaluated value, or the default value on failure.
    pub value: T,
    /// Key of the evaluated setting.
    pub key: String,
    /// Set when `value` is the caller's default rather than a served value.
    pub is_default_value: bool,
    /// Variation ID of the served value, when the config JSON has one.
    pub variation_id: Option<String>,
    /// The user the setting was evaluated for, after falling back to the default user.
    pub user: Option<User>,
    /// Why the evaluation failed.
    pub error: Option<ClientError>,
    /// When the config JSON used for the evaluation was downloaded. [`None`] for local overrides.
    pub fetch_time: Option<DateTime<Utc>>,
    /// The targeting rule that decided the value.
    pub matched_targeting_rule: Option<Arc<TargetingRule>>,
    /// The percentage option that decided the value.
    pub matched_percentage_option: Option<Arc<PercentageOption>>,
}

impl<T: Default> EvaluationDetails<T> {
    pub(crate) fn from_err(value: T, key: &str, user: Option<User>, err: ClientError) -> Self {
        Self {
            value,
            key: key.to_owned(),
            is_default_value: true,
            user,
            error: Some(err),
            ..EvaluationDetails::default()
        }
    }
}

impl<T> EvaluationDetails<T> {
    pub(crate) fn with_value<U>(self, value: U) -> EvaluationDetails<U> {
        EvaluationDetails {
            value,
            key: self.key,
            is_default_value: self.is_default_value,
            variation_id: self.variation_id,
            user: self.user,
            error: self.error,
            fetch_time: self.fetch_time,
            matched_targeting_rule: self.matched_targeting_rule,
            matched_percentage_option: self.matched_percentage_option,
        }
    }
}

impl EvaluationDetails<Option<Value>> {
    pub(crate) fn from_result(
        key: &str,
        user: Option<User>,
        result: EvalResult,
        fetch_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            value: Some(result.value),
            key: key.to_owned(),
            is_default_value: false,
            variation_id: result.variation_id,
            user,
            error: None,
            fetch_time,
            matched_targeting_rule: result.rule,
            matched_percentage_option: result.option,
        }
    }
}
