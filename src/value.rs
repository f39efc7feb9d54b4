//! Enumerations and value types shared across the filter tree, the provider interface, and
//! the grid translator.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The declared type of a dataset column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    String,
    Number,
    Currency,
    Percentage,
    Date,
    DateTime,
    Boolean,
}

/// A predicate operator usable in a [`crate::filter::FilterCondition`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    #[serde(rename = "isNull")]
    IsNull,
    #[serde(rename = "isNotNull")]
    IsNotNull,
    Between,
    In,
}

/// How a [`crate::filter::FilterGroup`]'s children combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCombinator {
    And,
    Or,
}

/// How a column's filter UI should be presented; purely descriptive metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterStyle {
    Operators,
    Select,
}

/// Sort direction for a [`SortSpec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// An aggregate function applicable to a measure column.
///
/// Wire values are aligned with AG Grid's `aggFunc` strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    DistinctCount,
    First,
    Last,
}

impl AggFunc {
    /// The lowercase token used both in pivot column keys and in export headers.
    pub fn token(self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
            AggFunc::DistinctCount => "distinct_count",
            AggFunc::First => "first",
            AggFunc::Last => "last",
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// The kind of display formatting a column's values call for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormatHintKind {
    Number,
    Currency,
    Percent,
    Date,
    DateTime,
}

/// Display formatting metadata for a column. Purely descriptive: the core never formats a
/// value itself, it only carries the hint through to whatever renders the column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatHints {
    pub kind: FormatHintKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
}

/// Whether a column participates in a pivot as a dimension or as a measure, and (for
/// measures) which aggregate functions are permitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRole {
    pub role: PivotRoleKind,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub allowed_aggs: Vec<AggFunc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotRoleKind {
    Dimension,
    Measure,
}

impl PivotRole {
    pub fn dimension() -> Self {
        PivotRole {
            role: PivotRoleKind::Dimension,
            allowed_aggs: Vec::new(),
        }
    }

    pub fn measure(allowed_aggs: Vec<AggFunc>) -> Self {
        PivotRole {
            role: PivotRoleKind::Measure,
            allowed_aggs,
        }
    }
}

/// Metadata describing one column of a dataset. Built at provider registration and immutable
/// thereafter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    pub operators: Vec<FilterOperator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_hints: Option<FormatHints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_style: Option<FilterStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pivot: Option<PivotRole>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, label: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnMeta {
            name: name.into(),
            label: label.into(),
            column_type,
            nullable: true,
            operators: Vec::new(),
            format_hints: None,
            enum_values: None,
            filter_style: None,
            pivot: None,
        }
    }

    pub fn with_operators(mut self, operators: Vec<FilterOperator>) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_pivot(mut self, pivot: PivotRole) -> Self {
        self.pivot = Some(pivot);
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// `true` iff this column may be used as a pivot/group-by measure, per the invariant that
    /// `pivot.allowed_aggs` is populated exactly when `role` is `"measure"`.
    pub fn is_measure(&self) -> bool {
        matches!(
            &self.pivot,
            Some(PivotRole {
                role: PivotRoleKind::Measure,
                ..
            })
        )
    }
}

/// Preset operator lists mirroring the column-type-appropriate defaults a provider commonly
/// assigns to `ColumnMeta.operators`.
pub const TEXT_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Neq,
    FilterOperator::Contains,
    FilterOperator::StartsWith,
    FilterOperator::EndsWith,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
    FilterOperator::In,
];

pub const NUMBER_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Neq,
    FilterOperator::Gt,
    FilterOperator::Lt,
    FilterOperator::Gte,
    FilterOperator::Lte,
    FilterOperator::Between,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
];

pub const DATE_OPERATORS: &[FilterOperator] = NUMBER_OPERATORS;

pub const BOOLEAN_OPERATORS: &[FilterOperator] =
    &[FilterOperator::Eq, FilterOperator::Neq, FilterOperator::IsNull, FilterOperator::IsNotNull];

/// A sort key: a column name plus direction. A list of these is applied as a lexicographic
/// key in list order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// A single requested measure: a column to aggregate, the function to aggregate it with, and
/// an optional display label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSpec {
    pub column: String,
    pub agg: AggFunc,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A scalar cell value. Tagged so that operator x value validation is a total function; both
/// the row evaluator and the SQL compiler pattern-match on this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// A lossy string rendering used to build pivot column keys and export headers; not
    /// round-trippable.
    pub fn stringify(&self) -> String {
        match self {
            ScalarValue::Null => "null".to_string(),
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            ScalarValue::String(s) => s.clone(),
        }
    }

    /// A "safe" partial comparison: `None` means incomparable (different variants, or either
    /// side null), which the row evaluator treats as a non-match rather than an error.
    pub fn safe_cmp(&self, other: &ScalarValue) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (ScalarValue::Number(a), ScalarValue::Number(b)) => a.partial_cmp(b),
            (ScalarValue::String(a), ScalarValue::String(b)) => Some(a.cmp(b)),
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        ScalarValue::Number(n)
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        ScalarValue::String(s)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Bool(b)
    }
}

/// The operator-dependent payload of a [`crate::filter::FilterCondition`]: a bare scalar for
/// comparisons, a pair for `BETWEEN`, a list for `IN`, or nothing for the null tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(ScalarValue),
    Pair(ScalarValue, ScalarValue),
    List(Vec<ScalarValue>),
}

impl FilterValue {
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            FilterValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<(&ScalarValue, &ScalarValue)> {
        match self {
            FilterValue::Pair(a, b) => Some((a, b)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ScalarValue]> {
        match self {
            FilterValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// One row, keyed by column name, as handed around by the in-memory provider and as returned
/// in a [`TabularResult`]/[`AggregateResult`].
pub type Row = BTreeMap<String, ScalarValue>;

/// The result of a flat `query`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total: usize,
}

/// One output column of an [`AggregateResult`]: either a plain group-by dimension column, or
/// a measure column generated for one discovered pivot combination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateColumn {
    pub key: String,
    pub header: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub pivot_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agg: Option<AggFunc>,
}

impl AggregateColumn {
    /// A plain row-group dimension column: no pivot keys, no measure/agg.
    pub fn dimension(name: impl Into<String>) -> Self {
        let name = name.into();
        AggregateColumn {
            key: name.clone(),
            header: name,
            pivot_keys: Vec::new(),
            measure: None,
            agg: None,
        }
    }

    /// A non-pivot measure column: `SUM(amount)` style, key and header both human-readable.
    pub fn measure_column(key: String, header: String, measure: String, agg: AggFunc) -> Self {
        AggregateColumn {
            key,
            header,
            pivot_keys: Vec::new(),
            measure: Some(measure),
            agg: Some(agg),
        }
    }

    /// A pivot measure column: one per `(discovered tuple x value spec)`.
    pub fn pivot_column(
        key: String,
        header: String,
        pivot_keys: Vec<String>,
        measure: String,
        agg: AggFunc,
    ) -> Self {
        AggregateColumn {
            key,
            header,
            pivot_keys,
            measure: Some(measure),
            agg: Some(agg),
        }
    }
}

/// The result of an `aggregate` call, simple or pivoted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub columns: Vec<AggregateColumn>,
    pub rows: Vec<Row>,
    pub total: usize,
}

/// Declares which optional behaviours a provider supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetCapabilities {
    pub pivot: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_meta_measure_invariant() {
        let dim = ColumnMeta::new("region", "Region", ColumnType::String).with_pivot(PivotRole::dimension());
        assert!(!dim.is_measure());

        let measure = ColumnMeta::new("amount", "Amount", ColumnType::Number)
            .with_pivot(PivotRole::measure(vec![AggFunc::Sum, AggFunc::Avg]));
        assert!(measure.is_measure());
    }

    #[test]
    fn scalar_stringify_renders_whole_numbers_without_decimal() {
        assert_eq!(ScalarValue::Number(420.0).stringify(), "420");
        assert_eq!(ScalarValue::Number(4.5).stringify(), "4.5");
        assert_eq!(ScalarValue::String("North".into()).stringify(), "North");
    }

    #[test]
    fn safe_cmp_is_none_across_variants_and_on_null() {
        assert_eq!(
            ScalarValue::Number(1.0).safe_cmp(&ScalarValue::String("a".into())),
            None
        );
        assert_eq!(ScalarValue::Null.safe_cmp(&ScalarValue::Null), None);
    }

    #[test]
    fn filter_group_json_uses_camel_case() {
        let spec = SortSpec {
            column: "region".into(),
            direction: SortDirection::Desc,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["direction"], "desc");
    }
}
