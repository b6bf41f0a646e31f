use crate::eval::details::EvaluationDetails;
use crate::eval::evaluator::ConditionResult::*;
use crate::eval::log_builder::EvalLogBuilder;
use crate::model::config::{
    Condition, Config, PercentageOption, PrerequisiteFlagCondition, SegmentCondition, Setting,
    SettingValue, TargetingRule, UserCondition,
};
use crate::model::enums::UserComparator::*;
use crate::model::enums::{
    PrerequisiteFlagComparator, SegmentComparator, SettingType, UserComparator,
};
use crate::user::{parse_semver, User, IDENTIFIER};
use crate::utils;
use crate::value::{OptionalValueDisplay, Value};
use crate::{ClientError, ErrorKind};
use log::{info, log_enabled, warn};
use semver::Version;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const RULE_IGNORED_MSG: &str =
    "The current targeting rule is ignored and the evaluation continues with the next rule.";
const SALT_MISSING_MSG: &str = "Config JSON salt is missing";
const COMP_VAL_INVALID_MSG: &str = "Comparison value is missing or invalid";

/// The outcome of a successful setting evaluation.
pub(crate) struct EvalResult {
    pub value: Value,
    pub variation_id: Option<String>,
    pub rule: Option<Arc<TargetingRule>>,
    pub option: Option<Arc<PercentageOption>>,
    pub setting_type: SettingType,
}

pub(crate) enum ConditionResult {
    Done(bool),
    NoUser,
    AttrMissing(String, String),
    AttrInvalid(String, String, String),
    CompValInvalid(Option<String>),
    Fatal(String),
}

impl ConditionResult {
    pub(crate) fn is_match(&self) -> bool {
        matches!(self, Done(true))
    }

    pub(crate) fn is_ok(&self) -> bool {
        matches!(self, Done(_))
    }
}

impl Display for ConditionResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Done(matched) => write!(f, "{matched}"),
            NoUser => f.write_str("cannot evaluate, User Object is missing"),
            AttrMissing(attr, _) => {
                write!(f, "cannot evaluate, the User.{attr} attribute is missing")
            }
            AttrInvalid(reason, attr, _) => write!(
                f,
                "cannot evaluate, the User.{attr} attribute is invalid ({reason})"
            ),
            CompValInvalid(err) => write!(
                f,
                "cannot evaluate ({})",
                err.as_deref().unwrap_or(COMP_VAL_INVALID_MSG)
            ),
            Fatal(err) => write!(f, "cannot evaluate ({err})"),
        }
    }
}

/// State of one top-level evaluation, threaded through prerequisite flag evaluations.
struct EvalContext<'a> {
    user: Option<&'a User>,
    settings: &'a HashMap<String, Setting>,
    visited: Vec<String>,
    user_missing_logged: bool,
    attr_missing_logged: bool,
    log: Option<EvalLogBuilder>,
}

impl EvalContext<'_> {
    fn trace(&mut self) -> Option<&mut EvalLogBuilder> {
        self.log.as_mut()
    }

    fn missing_user(&mut self, key: &str) -> ConditionResult {
        if !self.user_missing_logged {
            self.user_missing_logged = true;
            warn!(event_id = 3001; "Cannot evaluate targeting rules and % options for setting '{key}' (User Object is missing). You should pass a User Object to the evaluation methods like `get_value()` in order to make targeting work properly. Read more: https://configcat.com/docs/advanced/user-object/");
        }
        NoUser
    }
}

/// Evaluates the feature flag or setting identified by `key` against the given config.
///
/// Never fails: when the evaluation can't produce a result, the returned details carry
/// `default` as value along with the reason in [`EvaluationDetails::error`].
///
/// # Examples
///
/// ```rust
/// use configcat_core::{evaluate, Config, User, Value};
///
/// let config: Config = serde_json::from_str(r#"{"f": {"isEnabled": {"t": 0, "v": {"b": true}}}}"#).unwrap();
/// let details = evaluate(&config, "isEnabled", Some(&User::new("id")), Some(Value::Bool(false)));
/// assert_eq!(details.value, Some(Value::Bool(true)));
/// ```
pub fn evaluate(
    config: &Config,
    key: &str,
    user: Option<&User>,
    default: Option<Value>,
) -> EvaluationDetails<Option<Value>> {
    match eval_flag(config, key, user, default.as_ref()) {
        Ok(result) => EvaluationDetails::from_result(key, user.cloned(), result, None),
        Err(err) => EvaluationDetails::from_err(default, key, user.cloned(), err),
    }
}

pub(crate) fn eval_flag(
    config: &Config,
    key: &str,
    user: Option<&User>,
    default: Option<&Value>,
) -> Result<EvalResult, ClientError> {
    if config.settings.is_empty() {
        return Err(ClientError::new(
            ErrorKind::ConfigJsonNotAvailable,
            format!("Config JSON is not present when evaluating setting '{key}'. Returning the `defaultValue` parameter that you specified in your application: '{}'.", default.to_str()),
        ));
    }
    let Some(setting) = config.settings.get(key) else {
        let keys = config
            .keys()
            .map(|k| format!("'{k}'"))
            .collect::<Vec<String>>()
            .join(", ");
        return Err(ClientError::new(
            ErrorKind::SettingKeyMissing,
            format!("Failed to evaluate setting '{key}' (the key was not found in config JSON). Returning the `defaultValue` parameter that you specified in your application: '{}'. Available keys: [{keys}].", default.to_str()),
        ));
    };

    let mut ctx = EvalContext {
        user,
        settings: &config.settings,
        visited: Vec::new(),
        user_missing_logged: false,
        attr_missing_logged: false,
        log: if log_enabled!(log::Level::Info) {
            Some(EvalLogBuilder::default())
        } else {
            None
        },
    };
    if let Some(log) = ctx.trace() {
        log.append(format!("Evaluating '{key}'").as_str());
        if let Some(user) = user {
            log.append(format!(" for User '{user}'").as_str());
        }
        log.inc_indent();
    }

    let result = eval_setting(setting, key, &mut ctx);

    if let Some(log) = ctx.trace() {
        let returned = match &result {
            Ok(res) => format!("{}", res.value),
            Err(_) => default.to_str(),
        };
        log.new_ln(Some(format!("Returning '{returned}'.").as_str()));
        info!(event_id = 5000; "{}", log.content());
    }

    result.map_err(|err| {
        ClientError::new(
            ErrorKind::EvaluationFailure,
            format!("Failed to evaluate setting '{key}' ({err}). Returning the `defaultValue` parameter that you specified in your application: '{}'.", default.to_str()),
        )
    })
}

fn eval_setting(setting: &Setting, key: &str, ctx: &mut EvalContext) -> Result<EvalResult, String> {
    let setting_type = setting.setting_type;
    let salt = setting.salt.as_deref();

    if let Some(rules) = setting.targeting_rules.as_ref().filter(|r| !r.is_empty()) {
        if let Some(log) = ctx.trace() {
            log.new_ln(Some(
                "Evaluating targeting rules and applying the first match if any:",
            ));
        }
        for rule in rules {
            let conditions = rule.conditions.as_deref().unwrap_or_default();
            match eval_conditions(conditions, rule, key, salt, ctx) {
                Done(true) => {}
                Fatal(err) => return Err(err),
                _ => continue,
            }
            if let Some(served) = rule.served_value.as_ref() {
                return Ok(EvalResult {
                    value: setting_value(&served.value, &setting_type)?,
                    variation_id: served.variation_id.clone(),
                    rule: Some(Arc::clone(rule)),
                    option: None,
                    setting_type,
                });
            }
            let Some(options) = rule.percentage_options.as_ref().filter(|o| !o.is_empty()) else {
                return Err("Targeting rule THEN part is missing or invalid".to_owned());
            };
            if let Some(log) = ctx.trace() {
                log.inc_indent();
            }
            let selected = eval_percentage(options, key, setting, ctx);
            if let Some(log) = ctx.trace() {
                log.dec_indent();
            }
            if let Some(option) = selected {
                return Ok(EvalResult {
                    value: setting_value(&option.served_value, &setting_type)?,
                    variation_id: option.variation_id.clone(),
                    rule: Some(Arc::clone(rule)),
                    option: Some(option),
                    setting_type,
                });
            }
            if let Some(log) = ctx.trace() {
                log.inc_indent().new_ln(Some(RULE_IGNORED_MSG)).dec_indent();
            }
        }
    }

    if let Some(options) = setting.percentage_options.as_ref().filter(|o| !o.is_empty()) {
        if let Some(option) = eval_percentage(options, key, setting, ctx) {
            return Ok(EvalResult {
                value: setting_value(&option.served_value, &setting_type)?,
                variation_id: option.variation_id.clone(),
                rule: None,
                option: Some(option),
                setting_type,
            });
        }
    }

    Ok(EvalResult {
        value: setting_value(&setting.value, &setting_type)?,
        variation_id: setting.variation_id.clone(),
        rule: None,
        option: None,
        setting_type,
    })
}

fn setting_value(value: &SettingValue, setting_type: &SettingType) -> Result<Value, String> {
    value
        .as_val(setting_type)
        .ok_or_else(|| format!("Setting value is missing or not of the expected type {setting_type}"))
}

fn eval_percentage(
    options: &[Arc<PercentageOption>],
    key: &str,
    setting: &Setting,
    ctx: &mut EvalContext,
) -> Option<Arc<PercentageOption>> {
    let Some(user) = ctx.user else {
        ctx.missing_user(key);
        if let Some(log) = ctx.trace() {
            log.new_ln(Some("Skipping % options because the User Object is missing."));
        }
        return None;
    };
    let attr = setting.percentage_attribute.as_deref().unwrap_or(IDENTIFIER);
    let Some(attr_value) = user.get(attr) else {
        if !ctx.attr_missing_logged {
            ctx.attr_missing_logged = true;
            warn!(event_id = 3003; "Cannot evaluate % options for setting '{key}' (the User.{attr} attribute is missing). You should set the User.{attr} attribute in order to make targeting work properly. Read more: https://configcat.com/docs/advanced/user-object/");
        }
        if let Some(log) = ctx.trace() {
            log.new_ln(Some(
                format!("Skipping % options because the User.{attr} attribute is missing.")
                    .as_str(),
            ));
        }
        return None;
    };

    let (attr_value, _) = attr_value.as_str();
    let hash = utils::sha1(format!("{key}{attr_value}").as_str());
    let bucket = i64::from_str_radix(&hash[..7], 16).unwrap_or_default() % 100;
    if let Some(log) = ctx.trace() {
        log.new_ln(Some(
            format!("Evaluating % options based on the User.{attr} attribute:").as_str(),
        ))
        .new_ln(Some(
            format!("- Computing hash in the [0..99] range from User.{attr} => {bucket} (this value is sticky and consistent across all SDKs)").as_str(),
        ));
    }

    let mut cumulative = 0;
    for (index, option) in options.iter().enumerate() {
        cumulative += option.percentage;
        if bucket < cumulative {
            if let Some(log) = ctx.trace() {
                log.new_ln(Some(
                    format!(
                        "- Hash value {bucket} selects % option {} ({}%), '{}'.",
                        index + 1,
                        option.percentage,
                        option.served_value
                    )
                    .as_str(),
                ));
            }
            return Some(Arc::clone(option));
        }
    }
    if let Some(log) = ctx.trace() {
        log.new_ln(Some(
            format!("- Hash value {bucket} does not select any % option.").as_str(),
        ));
    }
    None
}

fn eval_conditions(
    conditions: &[Condition],
    rule: &TargetingRule,
    key: &str,
    salt: Option<&str>,
    ctx: &mut EvalContext,
) -> ConditionResult {
    if let Some(log) = ctx.trace() {
        log.new_ln(Some("- "));
    }
    let multiple = conditions.len() > 1;
    let mut new_line_before_then = multiple;
    let mut result = Done(true);
    for (index, condition) in conditions.iter().enumerate() {
        if let Some(log) = ctx.trace() {
            if index == 0 {
                log.append("IF ").inc_indent();
            } else {
                log.inc_indent().new_ln(Some("AND "));
            }
        }
        result = if let Some(user_condition) = condition.user_condition.as_ref() {
            if let Some(log) = ctx.trace() {
                log.append(format!("{user_condition}").as_str());
            }
            eval_user_condition(user_condition, key, salt, key, ctx)
        } else if let Some(segment_condition) = condition.segment_condition.as_ref() {
            if let Some(log) = ctx.trace() {
                log.append(format!("{segment_condition}").as_str());
            }
            new_line_before_then = true;
            eval_segment_cond(segment_condition, key, salt, ctx)
        } else if let Some(prerequisite) = condition.prerequisite_flag_condition.as_ref() {
            if let Some(log) = ctx.trace() {
                log.append(format!("{prerequisite}").as_str());
            }
            new_line_before_then = true;
            eval_prerequisite_cond(prerequisite, key, ctx)
        } else {
            Fatal(
                "Condition isn't a type of user, segment, or prerequisite flag condition"
                    .to_owned(),
            )
        };

        let matched = result.is_match();
        if let Some(log) = ctx.trace() {
            if multiple {
                let conclusion = if matched {
                    "true"
                } else {
                    "false, skipping the remaining AND conditions"
                };
                log.append(format!(" => {conclusion}").as_str());
            }
            log.dec_indent();
        }
        if !matched {
            break;
        }
    }
    if let Some(log) = ctx.trace() {
        log.append_then_clause(new_line_before_then, &result, rule);
    }
    result
}

fn eval_user_condition(
    cond: &UserCondition,
    key: &str,
    salt: Option<&str>,
    ctx_salt: &str,
    ctx: &mut EvalContext,
) -> ConditionResult {
    let Some(user) = ctx.user else {
        return ctx.missing_user(key);
    };
    let result = eval_user_cond(cond, key, user, salt, ctx_salt);
    match &result {
        AttrMissing(attr, cond_text) if !ctx.attr_missing_logged => {
            ctx.attr_missing_logged = true;
            warn!(event_id = 3003; "Cannot evaluate condition ({cond_text}) for setting '{key}' (the User.{attr} attribute is missing). You should set the User.{attr} attribute in order to make targeting work properly. Read more: https://configcat.com/docs/advanced/user-object/");
        }
        AttrInvalid(reason, attr, cond_text) => {
            warn!(event_id = 3004; "Cannot evaluate condition ({cond_text}) for setting '{key}' ({reason}). Please check the User.{attr} attribute and make sure that its value corresponds to the comparison operator.");
        }
        _ => {}
    }
    result
}

fn eval_segment_cond(
    cond: &SegmentCondition,
    key: &str,
    salt: Option<&str>,
    ctx: &mut EvalContext,
) -> ConditionResult {
    let Some(segment) = cond.segment.as_ref() else {
        return Fatal("Segment reference is invalid".to_owned());
    };
    if ctx.user.is_none() {
        return ctx.missing_user(key);
    }

    if let Some(log) = ctx.trace() {
        log.new_ln(Some("("))
            .inc_indent()
            .new_ln(Some(format!("Evaluating segment '{}':", segment.name).as_str()));
    }

    let mut result = Done(true);
    for (index, user_condition) in segment.conditions.iter().enumerate() {
        if let Some(log) = ctx.trace() {
            log.new_ln(Some("- "));
            if index == 0 {
                log.append("IF ").inc_indent();
            } else {
                log.inc_indent().new_ln(Some("AND "));
            }
            log.append(format!("{user_condition}").as_str());
        }
        result = eval_user_condition(user_condition, key, salt, &segment.name, ctx);
        let matched = result.is_match();
        if let Some(log) = ctx.trace() {
            let conclusion = if matched {
                "true"
            } else {
                "false, skipping the remaining AND conditions"
            };
            log.append(format!(" => {conclusion}").as_str()).dec_indent();
        }
        if !matched {
            break;
        }
    }

    let needs_true = cond.segment_comparator == SegmentComparator::IsIn;
    if let Some(log) = ctx.trace() {
        log.new_ln(Some("Segment evaluation result: "));
        if result.is_ok() {
            let membership = if result.is_match() {
                SegmentComparator::IsIn
            } else {
                SegmentComparator::IsNotIn
            };
            log.append(format!("User {membership}.").as_str());
        } else {
            log.append(format!("{result}.").as_str());
        }
        log.new_ln(Some(format!("Condition ({cond})").as_str()));
        if result.is_ok() {
            let outcome = result.is_match() == needs_true;
            log.append(format!(" evaluates to {outcome}.").as_str());
        } else {
            log.append(" failed to evaluate.");
        }
        log.dec_indent().new_ln(Some(")"));
    }

    match result {
        Done(matched) => Done(matched == needs_true),
        other => other,
    }
}

fn eval_prerequisite_cond(
    cond: &PrerequisiteFlagCondition,
    key: &str,
    ctx: &mut EvalContext,
) -> ConditionResult {
    let settings = ctx.settings;
    let Some(prerequisite) = settings.get(&cond.flag_key) else {
        return Fatal(format!("Prerequisite flag '{}' is missing", cond.flag_key));
    };
    if !cond.flag_value.is_valid(&prerequisite.setting_type) {
        return Fatal(format!(
            "Type mismatch between comparison value '{}' and prerequisite flag '{}'",
            cond.flag_value, cond.flag_key
        ));
    }

    ctx.visited.push(key.to_owned());
    if ctx.visited.contains(&cond.flag_key) {
        let path = ctx
            .visited
            .iter()
            .chain(std::iter::once(&cond.flag_key))
            .map(|k| format!("'{k}'"))
            .collect::<Vec<String>>()
            .join(" -> ");
        ctx.visited.pop();
        return Fatal(format!(
            "Circular dependency detected between the following depending flags: {path}"
        ));
    }

    if let Some(log) = ctx.trace() {
        log.new_ln(Some("(")).inc_indent().new_ln(Some(
            format!("Evaluating prerequisite flag '{}':", cond.flag_key).as_str(),
        ));
    }

    let result = eval_setting(prerequisite, cond.flag_key.as_str(), ctx);
    ctx.visited.pop();

    match result {
        Ok(res) => {
            let expected = cond.flag_value.as_val(&prerequisite.setting_type);
            let equals = expected.as_ref() == Some(&res.value);
            let matched = equals == (cond.prerequisite_comparator == PrerequisiteFlagComparator::Eq);
            if let Some(log) = ctx.trace() {
                log.new_ln(Some(
                    format!("Prerequisite flag evaluation result: '{}'.", res.value).as_str(),
                ))
                .new_ln(Some(
                    format!("Condition ({cond}) evaluates to {matched}.").as_str(),
                ))
                .dec_indent()
                .new_ln(Some(")"));
            }
            Done(matched)
        }
        Err(err) => {
            if let Some(log) = ctx.trace() {
                log.dec_indent().new_ln(Some(")"));
            }
            Fatal(err)
        }
    }
}

fn eval_user_cond(
    cond: &UserCondition,
    key: &str,
    user: &User,
    salt: Option<&str>,
    ctx_salt: &str,
) -> ConditionResult {
    let Some(user_attr) = user.get(&cond.comp_attr) else {
        return AttrMissing(cond.comp_attr.clone(), format!("{cond}"));
    };
    let salt = match salt {
        Some(salt) => salt,
        None if cond.comparator.is_sensitive() => return Fatal(SALT_MISSING_MSG.to_owned()),
        None => "",
    };
    let invalid_attr = |reason: String| AttrInvalid(reason, cond.comp_attr.clone(), format!("{cond}"));

    match cond.comparator {
        Eq | NotEq | EqHashed | NotEqHashed => {
            let Some(comp_val) = cond.string_val.as_ref() else {
                return CompValInvalid(None);
            };
            let user_val = text_attr(cond, key, user_attr.as_str());
            eval_text_eq(comp_val, &user_val, &cond.comparator, salt, ctx_salt)
        }
        OneOf | NotOneOf | OneOfHashed | NotOneOfHashed => {
            let Some(comp_val) = cond.string_vec_val.as_ref() else {
                return CompValInvalid(None);
            };
            let user_val = text_attr(cond, key, user_attr.as_str());
            eval_one_of(comp_val, &user_val, &cond.comparator, salt, ctx_salt)
        }
        StartsWithAnyOf
        | NotStartsWithAnyOf
        | StartsWithAnyOfHashed
        | NotStartsWithAnyOfHashed
        | EndsWithAnyOf
        | NotEndsWithAnyOf
        | EndsWithAnyOfHashed
        | NotEndsWithAnyOfHashed => {
            let Some(comp_val) = cond.string_vec_val.as_ref() else {
                return CompValInvalid(None);
            };
            let user_val = text_attr(cond, key, user_attr.as_str());
            eval_starts_ends_with(comp_val, &user_val, &cond.comparator, salt, ctx_salt)
        }
        Contains | NotContains => {
            let Some(comp_val) = cond.string_vec_val.as_ref() else {
                return CompValInvalid(None);
            };
            let user_val = text_attr(cond, key, user_attr.as_str());
            eval_contains(comp_val, &user_val, &cond.comparator)
        }
        OneOfSemver | NotOneOfSemver => {
            let Some(comp_val) = cond.string_vec_val.as_ref() else {
                return CompValInvalid(None);
            };
            let Some(user_val) = user_attr.as_semver() else {
                return invalid_attr(format!("'{user_attr}' is not a valid semantic version"));
            };
            eval_semver_is_one_of(comp_val, &user_val, &cond.comparator)
        }
        LessSemver | LessEqSemver | GreaterSemver | GreaterEqSemver => {
            let Some(comp_val) = cond.string_val.as_ref() else {
                return CompValInvalid(None);
            };
            let Some(user_val) = user_attr.as_semver() else {
                return invalid_attr(format!("'{user_attr}' is not a valid semantic version"));
            };
            eval_semver_compare(comp_val, &user_val, &cond.comparator)
        }
        EqNum | NotEqNum | LessNum | LessEqNum | GreaterNum | GreaterEqNum => {
            let Some(comp_val) = cond.float_val else {
                return CompValInvalid(None);
            };
            let Some(user_val) = user_attr.as_float() else {
                return invalid_attr(format!("'{user_attr}' is not a valid decimal number"));
            };
            eval_number_compare(comp_val, user_val, &cond.comparator)
        }
        BeforeDateTime | AfterDateTime => {
            let Some(comp_val) = cond.float_val else {
                return CompValInvalid(None);
            };
            let Some(user_val) = user_attr.as_timestamp() else {
                return invalid_attr(format!("'{user_attr}' is not a valid Unix timestamp (number of seconds elapsed since Unix epoch)"));
            };
            if cond.comparator == BeforeDateTime {
                Done(user_val < comp_val)
            } else {
                Done(user_val > comp_val)
            }
        }
        ArrayContainsAnyOf
        | ArrayNotContainsAnyOf
        | ArrayContainsAnyOfHashed
        | ArrayNotContainsAnyOfHashed => {
            let Some(comp_val) = cond.string_vec_val.as_ref() else {
                return CompValInvalid(None);
            };
            let Some(user_val) = user_attr.as_str_vec() else {
                return invalid_attr(format!("'{user_attr}' is not a valid string vector"));
            };
            eval_array_contains(comp_val, &user_val, &cond.comparator, salt, ctx_salt)
        }
    }
}

fn text_attr(cond: &UserCondition, key: &str, (value, converted): (String, bool)) -> String {
    if converted {
        warn!(event_id = 3005; "Evaluation of condition ({cond}) for setting '{key}' may not produce the expected result (the User.{} attribute is not a string value, thus it was automatically converted to the string value '{value}'). Please make sure that using a non-string value was intended.", cond.comp_attr);
    }
    value
}

fn eval_text_eq(
    comp_val: &str,
    user_val: &str,
    comp: &UserComparator,
    salt: &str,
    ctx_salt: &str,
) -> ConditionResult {
    let needs_true = matches!(comp, Eq | EqHashed);
    let equals = if comp.is_sensitive() {
        utils::sha256(user_val.as_bytes(), salt, ctx_salt) == comp_val
    } else {
        user_val == comp_val
    };
    Done(equals == needs_true)
}

fn eval_one_of(
    comp_val: &[String],
    user_val: &str,
    comp: &UserComparator,
    salt: &str,
    ctx_salt: &str,
) -> ConditionResult {
    let needs_true = matches!(comp, OneOf | OneOfHashed);
    let found = if comp.is_sensitive() {
        let hashed = utils::sha256(user_val.as_bytes(), salt, ctx_salt);
        comp_val.iter().any(|item| *item == hashed)
    } else {
        comp_val.iter().any(|item| item.trim() == user_val)
    };
    Done(found == needs_true)
}

fn eval_starts_ends_with(
    comp_val: &[String],
    user_val: &str,
    comp: &UserComparator,
    salt: &str,
    ctx_salt: &str,
) -> ConditionResult {
    let needs_true = matches!(
        comp,
        StartsWithAnyOf | StartsWithAnyOfHashed | EndsWithAnyOf | EndsWithAnyOfHashed
    );
    let starts = matches!(
        comp,
        StartsWithAnyOf | NotStartsWithAnyOf | StartsWithAnyOfHashed | NotStartsWithAnyOfHashed
    );
    let bytes = user_val.as_bytes();
    for item in comp_val {
        let matched = if comp.is_sensitive() {
            let Some((length, hash)) = item.split_once('_') else {
                return CompValInvalid(None);
            };
            let Ok(length) = length.trim().parse::<usize>() else {
                return CompValInvalid(None);
            };
            if hash.is_empty() {
                return CompValInvalid(None);
            }
            if length > bytes.len() {
                continue;
            }
            let chunk = if starts {
                &bytes[..length]
            } else {
                &bytes[bytes.len() - length..]
            };
            utils::sha256(chunk, salt, ctx_salt) == hash
        } else if starts {
            user_val.starts_with(item.as_str())
        } else {
            user_val.ends_with(item.as_str())
        };
        if matched {
            return Done(needs_true);
        }
    }
    Done(!needs_true)
}

fn eval_contains(comp_val: &[String], user_val: &str, comp: &UserComparator) -> ConditionResult {
    let found = comp_val.iter().any(|item| user_val.contains(item.as_str()));
    Done(found == (*comp == Contains))
}

fn eval_semver_is_one_of(
    comp_val: &[String],
    user_val: &Version,
    comp: &UserComparator,
) -> ConditionResult {
    let needs_true = *comp == OneOfSemver;
    let mut matched = false;
    for item in comp_val {
        if item.trim().is_empty() {
            continue;
        }
        let Some(comp_ver) = parse_semver(item) else {
            // An invalid comparison value makes the whole condition false.
            return Done(false);
        };
        matched |= *user_val == comp_ver;
    }
    Done(matched == needs_true)
}

fn eval_semver_compare(comp_val: &str, user_val: &Version, comp: &UserComparator) -> ConditionResult {
    let Some(comp_ver) = parse_semver(comp_val) else {
        return Done(false);
    };
    match comp {
        LessSemver => Done(*user_val < comp_ver),
        LessEqSemver => Done(*user_val <= comp_ver),
        GreaterSemver => Done(*user_val > comp_ver),
        _ => Done(*user_val >= comp_ver),
    }
}

fn eval_number_compare(comp_val: f64, user_val: f64, comp: &UserComparator) -> ConditionResult {
    match comp {
        EqNum => Done(user_val == comp_val),
        NotEqNum => Done(user_val != comp_val),
        LessNum => Done(user_val < comp_val),
        LessEqNum => Done(user_val <= comp_val),
        GreaterNum => Done(user_val > comp_val),
        _ => Done(user_val >= comp_val),
    }
}

fn eval_array_contains(
    comp_val: &[String],
    user_val: &[String],
    comp: &UserComparator,
    salt: &str,
    ctx_salt: &str,
) -> ConditionResult {
    let needs_true = matches!(comp, ArrayContainsAnyOf | ArrayContainsAnyOfHashed);
    let found = user_val.iter().any(|user_item| {
        if comp.is_sensitive() {
            let hashed = utils::sha256(user_item.as_bytes(), salt, ctx_salt);
            comp_val.iter().any(|item| *item == hashed)
        } else {
            comp_val.iter().any(|item| item == user_item)
        }
    });
    Done(found == needs_true)
}

#[cfg(test)]
mod evaluator_tests {
    use crate::eval::evaluator::{eval_flag, evaluate};
    use crate::model::config::Config;
    use crate::{ErrorKind, User, Value};
    use chrono::{DateTime, Utc};
    use std::str::FromStr;

    const CONFIG: &str = r#"{
        "p": {"u": "https://cdn-global.configcat.com", "r": 0, "s": "test-salt"},
        "s": [
            {"n": "Beta", "r": [{"a": "Email", "c": 2, "l": ["@beta.com"]}]},
            {"n": "Admins", "r": [{"a": "Role", "c": 20, "s": "a4c6f37d35c65d43a58a05ed8f4408c6d07b9c3be9735d0bc323def5bc950d3b"}]}
        ],
        "f": {
            "testBoolKey": {"t": 0, "v": {"b": true}, "i": "base"},
            "animal": {"t": 1, "v": {"s": "Cat"}, "i": "cat", "r": [
                {"c": [{"u": {"a": "Email", "c": 2, "l": ["@configcat.com"]}}], "s": {"v": {"s": "Dog"}, "i": "dog"}}
            ]},
            "pct": {"t": 1, "v": {"s": "Base"}, "p": [
                {"p": 50, "v": {"s": "A"}, "i": "a"},
                {"p": 50, "v": {"s": "B"}, "i": "b"}
            ]},
            "partialPct": {"t": 1, "v": {"s": "Base"}, "p": [{"p": 0, "v": {"s": "A"}}]},
            "firstMatch": {"t": 2, "v": {"i": 0}, "r": [
                {"c": [{"u": {"a": "Country", "c": 28, "s": "HU"}}], "s": {"v": {"i": 1}}},
                {"c": [{"u": {"a": "Country", "c": 0, "l": ["HU", "DE"]}}], "s": {"v": {"i": 2}}}
            ]},
            "shortCircuit": {"t": 0, "v": {"b": false}, "r": [
                {"c": [
                    {"u": {"a": "Email", "c": 28, "s": "nobody"}},
                    {"p": {"f": "missing", "c": 0, "v": {"b": true}}}
                ], "s": {"v": {"b": true}}}
            ]},
            "segment": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"s": {"s": 0, "c": 0}}], "s": {"v": {"b": true}}}
            ]},
            "hashedSegment": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"s": {"s": 1, "c": 0}}], "s": {"v": {"b": true}}}
            ]},
            "hashed": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"u": {"a": "Email", "c": 16, "l": ["a3acc34c7a0c7b7d881730150bfe555fb817a1cc2cb9a995882ca374202a59f9"]}}], "s": {"v": {"b": true}}}
            ]},
            "startsHashed": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"u": {"a": "Identifier", "c": 22, "l": ["3_727a7901dcc710b6da129ee9e3d929e03482d5b6d60646990cd54fd1a3df6441"]}}], "s": {"v": {"b": true}}}
            ]},
            "arrHashed": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"u": {"a": "Groups", "c": 26, "l": ["b1d1242569fa1e0d6d20fb656ce7e661723824ccc396fd6abc86beddab18c2eb"]}}], "s": {"v": {"b": true}}}
            ]},
            "semver": {"t": 1, "v": {"s": "new"}, "r": [
                {"c": [{"u": {"a": "Version", "c": 6, "s": " 2.0.0 "}}], "s": {"v": {"s": "old"}}}
            ]},
            "number": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"u": {"a": "Rating", "c": 14, "d": 3}}], "s": {"v": {"b": true}}}
            ]},
            "date": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"u": {"a": "Registered", "c": 19, "d": 1686756435}}], "s": {"v": {"b": true}}}
            ]},
            "main": {"t": 1, "v": {"s": "other"}, "r": [
                {"c": [{"p": {"f": "dependent", "c": 0, "v": {"b": true}}}], "s": {"v": {"s": "target"}}}
            ]},
            "dependent": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"p": {"f": "main", "c": 0, "v": {"s": "target"}}}], "s": {"v": {"b": true}}}
            ]},
            "prereqOk": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"p": {"f": "animal", "c": 1, "v": {"s": "Dog"}}}], "s": {"v": {"b": true}}}
            ]},
            "prereqMismatch": {"t": 0, "v": {"b": false}, "r": [
                {"c": [{"p": {"f": "animal", "c": 0, "v": {"b": true}}}], "s": {"v": {"b": true}}}
            ]}
        }
    }"#;

    fn config() -> Config {
        serde_json::from_str(CONFIG).unwrap()
    }

    fn value_of(key: &str, user: Option<&User>) -> Value {
        eval_flag(&config(), key, user, None).unwrap().value
    }

    #[test]
    fn plain_value() {
        let result = eval_flag(&config(), "testBoolKey", Some(&User::new("u")), None).unwrap();
        assert_eq!(result.value, Value::Bool(true));
        assert_eq!(result.variation_id.as_deref(), Some("base"));
        assert!(result.rule.is_none());
        assert!(result.option.is_none());
    }

    #[test]
    fn rule_match() {
        let joe = User::new("joe").email("joe@example.com");
        assert_eq!(value_of("animal", Some(&joe)), Value::String("Cat".to_owned()));
        let joe = User::new("joe").email("joe@configcat.com");
        let result = eval_flag(&config(), "animal", Some(&joe), None).unwrap();
        assert_eq!(result.value, Value::String("Dog".to_owned()));
        assert_eq!(result.variation_id.as_deref(), Some("dog"));
        assert!(result.rule.is_some());
    }

    #[test]
    fn rule_skipped_without_user() {
        assert_eq!(value_of("animal", None), Value::String("Cat".to_owned()));
    }

    #[test]
    fn percentage_is_sticky() {
        let user = User::new("12345");
        for _ in 0..5 {
            let result = eval_flag(&config(), "pct", Some(&user), None).unwrap();
            assert_eq!(result.value, Value::String("B".to_owned()));
            assert_eq!(result.variation_id.as_deref(), Some("b"));
            assert!(result.option.is_some());
        }
        assert_eq!(value_of("pct", None), Value::String("Base".to_owned()));
    }

    #[test]
    fn percentage_weights_below_hundred_fall_through() {
        let user = User::new("12345");
        assert_eq!(value_of("partialPct", Some(&user)), Value::String("Base".to_owned()));
    }

    #[test]
    fn first_match_wins() {
        let user = User::new("u").country("HU");
        assert_eq!(value_of("firstMatch", Some(&user)), Value::Int(1));
        let user = User::new("u").country("DE");
        assert_eq!(value_of("firstMatch", Some(&user)), Value::Int(2));
    }

    #[test]
    fn and_short_circuits() {
        let user = User::new("u").email("somebody");
        let result = eval_flag(&config(), "shortCircuit", Some(&user), None).unwrap();
        assert_eq!(result.value, Value::Bool(false));

        let user = User::new("u").email("nobody");
        let err = eval_flag(&config(), "shortCircuit", Some(&user), None)
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::EvaluationFailure);
        assert!(err.message.contains("Prerequisite flag 'missing' is missing"));
    }

    #[test]
    fn segments() {
        let beta = User::new("u").email("joe@beta.com");
        assert_eq!(value_of("segment", Some(&beta)), Value::Bool(true));
        let other = User::new("u").email("joe@example.com");
        assert_eq!(value_of("segment", Some(&other)), Value::Bool(false));

        let admin = User::new("u").custom("Role", "admin");
        assert_eq!(value_of("hashedSegment", Some(&admin)), Value::Bool(true));
        let guest = User::new("u").custom("Role", "guest");
        assert_eq!(value_of("hashedSegment", Some(&guest)), Value::Bool(false));
    }

    #[test]
    fn hashed_comparators() {
        let user = User::new("joe").email("a@b.com");
        assert_eq!(value_of("hashed", Some(&user)), Value::Bool(true));
        let user = User::new("joe").email("c@d.com");
        assert_eq!(value_of("hashed", Some(&user)), Value::Bool(false));

        assert_eq!(value_of("startsHashed", Some(&User::new("joe.smith"))), Value::Bool(true));
        assert_eq!(value_of("startsHashed", Some(&User::new("jo"))), Value::Bool(false));
        assert_eq!(value_of("startsHashed", Some(&User::new("é"))), Value::Bool(false));

        let user = User::new("u").custom("Groups", vec!["alpha", "beta"]);
        assert_eq!(value_of("arrHashed", Some(&user)), Value::Bool(true));
        let user = User::new("u").custom("Groups", r#"["gamma"]"#);
        assert_eq!(value_of("arrHashed", Some(&user)), Value::Bool(false));
        let user = User::new("u").custom("Groups", "not a list");
        assert_eq!(value_of("arrHashed", Some(&user)), Value::Bool(false));
    }

    #[test]
    fn semver_comparison() {
        let user = User::new("u").custom("Version", "1.9.9+build.1");
        assert_eq!(value_of("semver", Some(&user)), Value::String("old".to_owned()));
        let user = User::new("u").custom("Version", "2.0.0+build.1");
        assert_eq!(value_of("semver", Some(&user)), Value::String("new".to_owned()));
        let user = User::new("u").custom("Version", "invalid");
        assert_eq!(value_of("semver", Some(&user)), Value::String("new".to_owned()));
    }

    #[test]
    fn number_and_date_comparison() {
        let user = User::new("u").custom("Rating", "3,5");
        assert_eq!(value_of("number", Some(&user)), Value::Bool(true));
        let user = User::new("u").custom("Rating", 2);
        assert_eq!(value_of("number", Some(&user)), Value::Bool(false));

        let date: DateTime<Utc> = DateTime::from_str("2023-06-14T15:27:16Z").unwrap();
        let user = User::new("u").custom("Registered", date);
        assert_eq!(value_of("date", Some(&user)), Value::Bool(true));
        let user = User::new("u").custom("Registered", 1686756434);
        assert_eq!(value_of("date", Some(&user)), Value::Bool(false));
    }

    #[test]
    fn prerequisites() {
        let user = User::new("u").email("joe@example.com");
        assert_eq!(value_of("prereqOk", Some(&user)), Value::Bool(true));
        let user = User::new("u").email("joe@configcat.com");
        assert_eq!(value_of("prereqOk", Some(&user)), Value::Bool(false));

        let err = eval_flag(&config(), "prereqMismatch", None, None).err().unwrap();
        assert_eq!(err.kind, ErrorKind::EvaluationFailure);
        assert!(err.message.contains("Type mismatch"));
    }

    #[test]
    fn circular_dependency() {
        let details = evaluate(&config(), "dependent", None, Some(Value::Bool(false)));
        assert_eq!(details.value, Some(Value::Bool(false)));
        assert!(details.is_default_value);
        let err = details.error.unwrap();
        assert_eq!(err.kind, ErrorKind::EvaluationFailure);
        assert!(err.message.contains("'dependent' -> 'main' -> 'dependent'"));
    }

    #[test]
    fn missing_key_lists_keys_in_order() {
        let details = evaluate(&config(), "nonexisting", None, None);
        let err = details.error.unwrap();
        assert_eq!(err.kind, ErrorKind::SettingKeyMissing);
        assert!(err
            .message
            .contains("Available keys: ['testBoolKey', 'animal', 'pct', 'partialPct',"));
    }

    #[test]
    fn empty_config() {
        let config: Config = serde_json::from_str(r#"{"f": {}}"#).unwrap();
        let details = evaluate(&config, "key", None, Some(Value::Int(5)));
        assert_eq!(details.value, Some(Value::Int(5)));
        assert_eq!(details.error.unwrap().kind, ErrorKind::ConfigJsonNotAvailable);
    }
}
