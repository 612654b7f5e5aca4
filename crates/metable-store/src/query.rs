//! Filtering and ordering owners by their current metadata.
//!
//! Every filter is evaluated against the owner's current snapshot as of the
//! query instant, never against history or planned rows.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use metable_codec::HandlerRegistry;
use metable_types::{time, EntityId, MetaValue, Timestamp};
use regex::Regex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::{normalize_key, MetaRecord};
use crate::resolver::TemporalResolver;
use crate::traits::MetaStore;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Comparison operator for value filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// SQL `LIKE`: `%` matches any run, `_` one character, case-insensitive.
    Like,
    NotLike,
}

impl CompareOp {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Like | Self::NotLike => false,
        }
    }

    fn is_pattern(&self) -> bool {
        matches!(self, Self::Like | Self::NotLike)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "like",
            Self::NotLike => "not like",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CompareOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match normalized.as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "like" => Ok(Self::Like),
            "not like" => Ok(Self::NotLike),
            _ => Err(StoreError::InvalidPattern {
                pattern: s.to_string(),
                reason: "unknown comparison operator".into(),
            }),
        }
    }
}

/// Compile a SQL `LIKE` pattern. `\` escapes the next character.
fn like_regex(pattern: &str) -> StoreResult<Regex> {
    let mut out = String::from("(?is)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| StoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

// ---------------------------------------------------------------------------
// Query description
// ---------------------------------------------------------------------------

/// One condition on an owner's current metadata.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaFilter {
    /// Every key has a current value.
    HasAll(Vec<String>),
    /// At least one key has a current value.
    HasAny(Vec<String>),
    /// None of the keys has a current value.
    DoesntHave(Vec<String>),
    /// The current value has the given (or classified) type and compares
    /// to `value` under `op`.
    Value {
        key: String,
        op: CompareOp,
        value: MetaValue,
        type_id: Option<String>,
    },
    /// The stored text compares to `raw` under `op`, whatever its type.
    Raw { key: String, op: CompareOp, raw: String },
    /// The current value equals one of `values`, matched per type.
    In { key: String, values: Vec<MetaValue> },
    /// No current value, a null value, or empty text.
    Empty(String),
    NotEmpty(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaOrder {
    pub key: String,
    pub direction: SortDirection,
    /// Compare stored text as numbers.
    pub numeric: bool,
}

/// A filter over the owners of one type.
///
/// ```ignore
/// let published = MetaQuery::new("post")
///     .where_meta("status", CompareOp::Eq, "live")
///     .where_doesnt_have_meta(["hidden"])
///     .order_by_meta("rank", SortDirection::Desc, true)
///     .run(&store, &registry, &candidates)?;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct MetaQuery {
    owner_type: String,
    at: Option<Timestamp>,
    filters: Vec<MetaFilter>,
    order: Vec<MetaOrder>,
}

fn keys<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter().map(|k| normalize_key(k.as_ref())).collect()
}

impl MetaQuery {
    pub fn new(owner_type: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            at: None,
            filters: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Resolve snapshots as of `at` instead of now.
    pub fn as_of(mut self, at: Option<Timestamp>) -> Self {
        self.at = at;
        self
    }

    pub fn instant(&self) -> Option<Timestamp> {
        self.at
    }

    pub fn filters(&self) -> &[MetaFilter] {
        &self.filters
    }

    pub fn filter(mut self, filter: MetaFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_has_meta<I: IntoIterator<Item = S>, S: AsRef<str>>(self, k: I) -> Self {
        self.filter(MetaFilter::HasAll(keys(k)))
    }

    pub fn where_has_any_meta<I: IntoIterator<Item = S>, S: AsRef<str>>(self, k: I) -> Self {
        self.filter(MetaFilter::HasAny(keys(k)))
    }

    pub fn where_doesnt_have_meta<I: IntoIterator<Item = S>, S: AsRef<str>>(self, k: I) -> Self {
        self.filter(MetaFilter::DoesntHave(keys(k)))
    }

    pub fn where_meta(self, key: &str, op: CompareOp, value: impl Into<MetaValue>) -> Self {
        self.filter(MetaFilter::Value {
            key: normalize_key(key),
            op,
            value: value.into(),
            type_id: None,
        })
    }

    pub fn where_meta_of_type(
        self,
        key: &str,
        op: CompareOp,
        value: impl Into<MetaValue>,
        type_id: &str,
    ) -> Self {
        self.filter(MetaFilter::Value {
            key: normalize_key(key),
            op,
            value: value.into(),
            type_id: Some(type_id.to_string()),
        })
    }

    pub fn where_raw_meta(self, key: &str, op: CompareOp, raw: impl Into<String>) -> Self {
        self.filter(MetaFilter::Raw {
            key: normalize_key(key),
            op,
            raw: raw.into(),
        })
    }

    pub fn where_meta_in<I, V>(self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MetaValue>,
    {
        self.filter(MetaFilter::In {
            key: normalize_key(key),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn where_meta_empty(self, key: &str) -> Self {
        self.filter(MetaFilter::Empty(normalize_key(key)))
    }

    pub fn where_meta_not_empty(self, key: &str) -> Self {
        self.filter(MetaFilter::NotEmpty(normalize_key(key)))
    }

    pub fn order_by_meta(mut self, key: &str, direction: SortDirection, numeric: bool) -> Self {
        self.order.push(MetaOrder {
            key: normalize_key(key),
            direction,
            numeric,
        });
        self
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Keep the `candidates` that match every filter, in candidate order
    /// unless an ordering is set. Owners without a value for an ordering key
    /// sort first ascending and last descending.
    pub fn run(
        &self,
        store: &dyn MetaStore,
        registry: &HandlerRegistry,
        candidates: &[EntityId],
    ) -> StoreResult<Vec<EntityId>> {
        let at = self.at.unwrap_or_else(time::now);
        let compiled = self
            .filters
            .iter()
            .map(|f| Compiled::new(f, registry))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut by_owner: HashMap<EntityId, Vec<MetaRecord>> = HashMap::new();
        for record in store.records_for_type(&self.owner_type)? {
            if let Some(owner_id) = record.owner_id().cloned() {
                by_owner.entry(owner_id).or_default().push(record);
            }
        }
        let empty = Vec::new();
        let snapshots: HashMap<&EntityId, BTreeMap<String, MetaRecord>> = candidates
            .iter()
            .map(|id| {
                let records = by_owner.get(id).unwrap_or(&empty);
                let snapshot = TemporalResolver::at(records, at)
                    .current_map()
                    .into_iter()
                    .map(|(k, r)| (k.to_string(), r.clone()))
                    .collect();
                (id, snapshot)
            })
            .collect();

        let mut matched: Vec<&EntityId> = candidates
            .iter()
            .filter(|id| {
                let snapshot = &snapshots[id];
                compiled.iter().all(|f| f.matches(snapshot))
            })
            .collect();

        if !self.order.is_empty() {
            matched.sort_by(|a, b| {
                self.order.iter().fold(Ordering::Equal, |acc, order| {
                    acc.then_with(|| {
                        let lhs = sort_key(&snapshots[a], order);
                        let rhs = sort_key(&snapshots[b], order);
                        let ordering = compare_sort_keys(&lhs, &rhs);
                        match order.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                })
            });
        }
        debug!(
            owner_type = %self.owner_type,
            candidates = candidates.len(),
            matched = matched.len(),
            "evaluated meta query"
        );
        Ok(matched.into_iter().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Compiled filters
// ---------------------------------------------------------------------------

enum Compiled<'q> {
    HasAll(&'q [String]),
    HasAny(&'q [String]),
    DoesntHave(&'q [String]),
    Value {
        key: &'q str,
        op: CompareOp,
        raw: String,
        type_id: String,
        numeric: Option<f64>,
        pattern: Option<Regex>,
    },
    Raw {
        key: &'q str,
        op: CompareOp,
        raw: &'q str,
        pattern: Option<Regex>,
    },
    In {
        key: &'q str,
        by_type: HashMap<String, HashSet<Option<String>>>,
    },
    Empty(&'q str, bool),
}

impl<'q> Compiled<'q> {
    fn new(filter: &'q MetaFilter, registry: &HandlerRegistry) -> StoreResult<Self> {
        Ok(match filter {
            MetaFilter::HasAll(keys) => Self::HasAll(keys),
            MetaFilter::HasAny(keys) => Self::HasAny(keys),
            MetaFilter::DoesntHave(keys) => Self::DoesntHave(keys),
            MetaFilter::Value {
                key,
                op,
                value,
                type_id,
            } => {
                let (raw, type_id) = registry.serialize(value, type_id.as_deref())?;
                let raw = raw.unwrap_or_default();
                let pattern = op.is_pattern().then(|| like_regex(&raw)).transpose()?;
                Self::Value {
                    key,
                    op: *op,
                    numeric: registry.numeric_value(&type_id, value),
                    raw,
                    type_id,
                    pattern,
                }
            }
            MetaFilter::Raw { key, op, raw } => Self::Raw {
                key,
                op: *op,
                raw,
                pattern: op.is_pattern().then(|| like_regex(raw)).transpose()?,
            },
            MetaFilter::In { key, values } => {
                // Candidates are matched per type: "1" as an integer never
                // matches "1" stored as a string.
                let mut by_type: HashMap<String, HashSet<Option<String>>> = HashMap::new();
                for value in values {
                    let (raw, type_id) = registry.serialize(value, None)?;
                    by_type.entry(type_id).or_default().insert(raw);
                }
                Self::In { key, by_type }
            }
            MetaFilter::Empty(key) => Self::Empty(key, true),
            MetaFilter::NotEmpty(key) => Self::Empty(key, false),
        })
    }

    fn matches(&self, snapshot: &BTreeMap<String, MetaRecord>) -> bool {
        match self {
            Self::HasAll(keys) => keys.iter().all(|k| snapshot.contains_key(k)),
            Self::HasAny(keys) => keys.iter().any(|k| snapshot.contains_key(k)),
            Self::DoesntHave(keys) => !keys.iter().any(|k| snapshot.contains_key(k)),
            Self::Value {
                key,
                op,
                raw,
                type_id,
                numeric,
                pattern,
            } => {
                let Some(record) = snapshot.get(*key) else {
                    return false;
                };
                if record.type_id() != Some(type_id.as_str()) {
                    return false;
                }
                let stored = record.raw_value().unwrap_or_default();
                if let Some(pattern) = pattern {
                    return pattern.is_match(stored) == (*op == CompareOp::Like);
                }
                let stored_number = stored.trim().parse::<f64>().ok();
                match (numeric, stored_number) {
                    (Some(wanted), Some(have)) => have
                        .partial_cmp(wanted)
                        .is_some_and(|ordering| op.accepts(ordering)),
                    _ => op.accepts(stored.cmp(raw.as_str())),
                }
            }
            Self::Raw {
                key,
                op,
                raw,
                pattern,
            } => {
                let Some(record) = snapshot.get(*key) else {
                    return false;
                };
                let stored = record.raw_value().unwrap_or_default();
                match pattern {
                    Some(pattern) => pattern.is_match(stored) == (*op == CompareOp::Like),
                    None => op.accepts(stored.cmp(raw)),
                }
            }
            Self::In { key, by_type } => snapshot.get(*key).is_some_and(|record| {
                record
                    .type_id()
                    .and_then(|t| by_type.get(t))
                    .is_some_and(|raws| raws.contains(&record.raw_value().map(str::to_string)))
            }),
            Self::Empty(key, want_empty) => {
                let empty = match snapshot.get(*key) {
                    None => true,
                    Some(record) => {
                        record.type_id() == Some(metable_codec::type_ids::NULL)
                            || record.raw_value().map_or(true, str::is_empty)
                    }
                };
                empty == *want_empty
            }
        }
    }
}

enum SortKey {
    Missing,
    Number(f64),
    Text(String),
}

fn sort_key(snapshot: &BTreeMap<String, MetaRecord>, order: &MetaOrder) -> SortKey {
    let Some(raw) = snapshot.get(&order.key).and_then(|r| r.raw_value()) else {
        return SortKey::Missing;
    };
    if order.numeric {
        raw.trim()
            .parse::<f64>()
            .map(SortKey::Number)
            .unwrap_or(SortKey::Missing)
    } else {
        SortKey::Text(raw.to_string())
    }
}

fn compare_sort_keys(lhs: &SortKey, rhs: &SortKey) -> Ordering {
    match (lhs, rhs) {
        (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
        (SortKey::Missing, _) => Ordering::Less,
        (_, SortKey::Missing) => Ordering::Greater,
        (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
        (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
        (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
    }
}
