use serde_repr::Deserialize_repr;
use std::fmt::{Display, Formatter};

/// Selects the CDN region the config JSON is downloaded from.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum DataGovernance {
    /// Global CDN nodes.
    Global,
    /// CDN nodes located in the EU only.
    EU,
}

/// Tells the fetcher whether it should switch to the base URL announced in the config JSON.
#[derive(Debug, Deserialize_repr, PartialEq, Clone, Copy)]
#[repr(u8)]
pub enum RedirectMode {
    No = 0,
    Should = 1,
    Force = 2,
}

/// Describes the state of the locally available config JSON.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ClientCacheState {
    /// There's no config JSON available, neither from the cache nor from local overrides.
    NoFlagData,
    /// Only local override data is used for evaluation (see [`crate::OverrideBehavior::LocalOnly`]).
    HasLocalOverrideFlagDataOnly,
    /// The config JSON comes from the cache, it might not be up to date.
    HasCachedFlagDataOnly,
    /// The config JSON is up to date according to the configured polling mode.
    HasUpToDateFlagData,
}

/// The type of a feature flag or setting value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize_repr)]
#[repr(u8)]
pub enum SettingType {
    /// `bool`, used by feature flags.
    Bool = 0,
    /// Text.
    String = 1,
    /// Whole number (`i64`).
    Int = 2,
    /// Decimal number (`f64`).
    Float = 3,
}

impl Display for SettingType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SettingType::Bool => "Bool",
            SettingType::String => "String",
            SettingType::Int => "Int",
            SettingType::Float => "Float",
        };
        f.write_str(name)
    }
}

/// Operator of a segment condition.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize_repr)]
#[repr(u8)]
pub enum SegmentComparator {
    /// Matches when every condition of the segment holds for the user.
    IsIn = 0,
    /// Matches when any condition of the segment fails for the user.
    IsNotIn = 1,
}

impl Display for SegmentComparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SegmentComparator::IsIn => "IS IN SEGMENT",
            SegmentComparator::IsNotIn => "IS NOT IN SEGMENT",
        })
    }
}

/// Operator of a prerequisite flag condition.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize_repr)]
#[repr(u8)]
pub enum PrerequisiteFlagComparator {
    /// Matches when the prerequisite flag evaluates to the comparison value.
    Eq = 0,
    /// Matches when the prerequisite flag evaluates to anything but the comparison value.
    NotEq = 1,
}

impl Display for PrerequisiteFlagComparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PrerequisiteFlagComparator::Eq => "EQUALS",
            PrerequisiteFlagComparator::NotEq => "NOT EQUALS",
        })
    }
}

/// Operator of a user attribute condition.
///
/// The `*Hashed` variants compare the salted SHA-256 hash of the attribute instead of its
/// plain text, the `*Semver` ones parse the attribute as a semantic version, the `*Num` ones
/// as a decimal number, and the date ones as seconds elapsed since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize_repr)]
#[repr(u8)]
pub enum UserComparator {
    /// Attribute equals any of the comparison values.
    OneOf = 0,
    /// Attribute equals none of the comparison values.
    NotOneOf = 1,
    /// Attribute contains any of the comparison values as a substring.
    Contains = 2,
    /// Attribute contains none of the comparison values as a substring.
    NotContains = 3,
    /// Version equals any of the comparison values.
    OneOfSemver = 4,
    /// Version equals none of the comparison values.
    NotOneOfSemver = 5,
    /// Version `<` comparison value.
    LessSemver = 6,
    /// Version `<=` comparison value.
    LessEqSemver = 7,
    /// Version `>` comparison value.
    GreaterSemver = 8,
    /// Version `>=` comparison value.
    GreaterEqSemver = 9,
    /// Number `=` comparison value.
    EqNum = 10,
    /// Number `!=` comparison value.
    NotEqNum = 11,
    /// Number `<` comparison value.
    LessNum = 12,
    /// Number `<=` comparison value.
    LessEqNum = 13,
    /// Number `>` comparison value.
    GreaterNum = 14,
    /// Number `>=` comparison value.
    GreaterEqNum = 15,
    /// Hash of the attribute equals any of the comparison values.
    OneOfHashed = 16,
    /// Hash of the attribute equals none of the comparison values.
    NotOneOfHashed = 17,
    /// Timestamp is before the comparison value.
    BeforeDateTime = 18,
    /// Timestamp is after the comparison value.
    AfterDateTime = 19,
    /// Hash of the attribute equals the comparison value.
    EqHashed = 20,
    /// Hash of the attribute differs from the comparison value.
    NotEqHashed = 21,
    /// Hash of a prefix of the attribute equals any of the comparison values.
    StartsWithAnyOfHashed = 22,
    /// Hash of a prefix of the attribute equals none of the comparison values.
    NotStartsWithAnyOfHashed = 23,
    /// Hash of a suffix of the attribute equals any of the comparison values.
    EndsWithAnyOfHashed = 24,
    /// Hash of a suffix of the attribute equals none of the comparison values.
    NotEndsWithAnyOfHashed = 25,
    /// Hash of any item of the string list attribute equals any of the comparison values.
    ArrayContainsAnyOfHashed = 26,
    /// Hashes of the string list attribute items equal none of the comparison values.
    ArrayNotContainsAnyOfHashed = 27,
    /// Attribute equals the comparison value.
    Eq = 28,
    /// Attribute differs from the comparison value.
    NotEq = 29,
    /// Attribute starts with any of the comparison values.
    StartsWithAnyOf = 30,
    /// Attribute starts with none of the comparison values.
    NotStartsWithAnyOf = 31,
    /// Attribute ends with any of the comparison values.
    EndsWithAnyOf = 32,
    /// Attribute ends with none of the comparison values.
    NotEndsWithAnyOf = 33,
    /// The string list attribute contains any of the comparison values.
    ArrayContainsAnyOf = 34,
    /// The string list attribute contains none of the comparison values.
    ArrayNotContainsAnyOf = 35,
}

impl UserComparator {
    /// Tells whether the comparison values are salted hashes.
    pub(crate) fn is_sensitive(&self) -> bool {
        use UserComparator::*;
        matches!(
            self,
            OneOfHashed
                | NotOneOfHashed
                | EqHashed
                | NotEqHashed
                | StartsWithAnyOfHashed
                | NotStartsWithAnyOfHashed
                | EndsWithAnyOfHashed
                | NotEndsWithAnyOfHashed
                | ArrayContainsAnyOfHashed
                | ArrayNotContainsAnyOfHashed
        )
    }

    pub(crate) fn is_date(&self) -> bool {
        matches!(self, UserComparator::BeforeDateTime | UserComparator::AfterDateTime)
    }

    /// The operator as it appears in the evaluation trace. Hashed and plain variants share it.
    fn label(&self) -> &'static str {
        use UserComparator::*;
        match self {
            OneOf | OneOfSemver | OneOfHashed => "IS ONE OF",
            NotOneOf | NotOneOfSemver | NotOneOfHashed => "IS NOT ONE OF",
            Contains => "CONTAINS ANY OF",
            NotContains => "NOT CONTAINS ANY OF",
            LessSemver | LessNum => "<",
            LessEqSemver | LessEqNum => "<=",
            GreaterSemver | GreaterNum => ">",
            GreaterEqSemver | GreaterEqNum => ">=",
            EqNum => "=",
            NotEqNum => "!=",
            BeforeDateTime => "BEFORE",
            AfterDateTime => "AFTER",
            Eq | EqHashed => "EQUALS",
            NotEq | NotEqHashed => "NOT EQUALS",
            StartsWithAnyOf | StartsWithAnyOfHashed => "STARTS WITH ANY OF",
            NotStartsWithAnyOf | NotStartsWithAnyOfHashed => "NOT STARTS WITH ANY OF",
            EndsWithAnyOf | EndsWithAnyOfHashed => "ENDS WITH ANY OF",
            NotEndsWithAnyOf | NotEndsWithAnyOfHashed => "NOT ENDS WITH ANY OF",
            ArrayContainsAnyOf | ArrayContainsAnyOfHashed => "ARRAY CONTAINS ANY OF",
            ArrayNotContainsAnyOf | ArrayNotContainsAnyOfHashed => "ARRAY NOT CONTAINS ANY OF",
        }
    }
}

impl Display for UserComparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
