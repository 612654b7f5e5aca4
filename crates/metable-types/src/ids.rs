use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;
use uuid::Uuid;

use crate::error::TypeError;

/// Identifier of an owner entity or a stored metadata record.
///
/// Deployments pick one [`IdStrategy`]; all ids minted under it are of the
/// same variant, so the derived ordering matches insertion order for every
/// strategy (auto-increment integers, UUID v7 and monotonic ULIDs are all
/// time-ordered).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Int(i64),
    Uuid(Uuid),
    Ulid(Ulid),
}

impl EntityId {
    /// The strategy this id belongs to.
    pub fn strategy(&self) -> IdStrategy {
        match self {
            Self::Int(_) => IdStrategy::Integer,
            Self::Uuid(_) => IdStrategy::Uuid,
            Self::Ulid(_) => IdStrategy::Ulid,
        }
    }

    /// Parse id text without knowing the strategy up front.
    ///
    /// Integers win over UUIDs, which win over ULIDs.
    pub fn parse_any(text: &str) -> Result<Self, TypeError> {
        let text = text.trim();
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Self::Int(n));
        }
        if let Ok(uuid) = Uuid::parse_str(text) {
            return Ok(Self::Uuid(uuid));
        }
        Ulid::from_string(text)
            .map(Self::Ulid)
            .map_err(|_| TypeError::InvalidId {
                strategy: "any".into(),
                value: text.to_string(),
            })
    }

    /// JSON form: integers as numbers, everything else as strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(n) => serde_json::Value::from(*n),
            other => serde_json::Value::String(other.to_string()),
        }
    }

    /// Inverse of [`EntityId::to_json`]. Returns `None` for null or malformed ids.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Self::Int),
            serde_json::Value::String(s) => Self::parse_any(s).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Ulid(u) => write!(f, "{u}"),
        }
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({self})")
    }
}

impl FromStr for EntityId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_any(s)
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<Uuid> for EntityId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<Ulid> for EntityId {
    fn from(u: Ulid) -> Self {
        Self::Ulid(u)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum EntityIdRepr {
    Int(i64),
    Text(String),
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(n) => EntityIdRepr::Int(*n).serialize(serializer),
            other => EntityIdRepr::Text(other.to_string()).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match EntityIdRepr::deserialize(deserializer)? {
            EntityIdRepr::Int(n) => Ok(Self::Int(n)),
            EntityIdRepr::Text(s) => Self::parse_any(&s).map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// IdStrategy
// ---------------------------------------------------------------------------

/// How owner and record primary keys are minted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Auto-incrementing integers assigned by the store.
    #[default]
    Integer,
    /// Client-generated UUID v7 strings.
    Uuid,
    /// Client-generated ULID strings.
    Ulid,
}

impl IdStrategy {
    /// Strictly parse id text for this strategy.
    pub fn parse(&self, text: &str) -> Result<EntityId, TypeError> {
        let invalid = || TypeError::InvalidId {
            strategy: self.to_string(),
            value: text.to_string(),
        };
        match self {
            Self::Integer => text.trim().parse::<i64>().map(EntityId::Int).map_err(|_| invalid()),
            Self::Uuid => Uuid::parse_str(text.trim()).map(EntityId::Uuid).map_err(|_| invalid()),
            Self::Ulid => Ulid::from_string(text.trim()).map(EntityId::Ulid).map_err(|_| invalid()),
        }
    }

    /// Returns `true` for strategies whose ids are generated before the first persist.
    pub fn is_client_generated(&self) -> bool {
        !matches!(self, Self::Integer)
    }

    /// SQL column type for ids of this strategy.
    pub fn column_type(&self) -> &'static str {
        match self {
            Self::Integer => "BIGINT",
            Self::Uuid => "CHAR(36)",
            Self::Ulid => "CHAR(26)",
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "integer",
            Self::Uuid => "uuid",
            Self::Ulid => "ulid",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IdStrategy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(Self::Integer),
            "uuid" => Ok(Self::Uuid),
            "ulid" => Ok(Self::Ulid),
            other => Err(TypeError::InvalidId {
                strategy: "strategy".into(),
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// IdGenerator
// ---------------------------------------------------------------------------

/// Mints monotonically increasing ids for one strategy.
pub struct IdGenerator {
    strategy: IdStrategy,
    next_int: i64,
    ulids: ulid::Generator,
}

impl IdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self::starting_at(strategy, 1)
    }

    /// Integer ids start at `first`; ignored by the other strategies.
    pub fn starting_at(strategy: IdStrategy, first: i64) -> Self {
        Self {
            strategy,
            next_int: first,
            ulids: ulid::Generator::new(),
        }
    }

    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    pub fn next_id(&mut self) -> Result<EntityId, TypeError> {
        match self.strategy {
            IdStrategy::Integer => {
                let id = self.next_int;
                self.next_int += 1;
                Ok(EntityId::Int(id))
            }
            IdStrategy::Uuid => Ok(EntityId::Uuid(Uuid::now_v7())),
            IdStrategy::Ulid => self
                .ulids
                .generate()
                .map(EntityId::Ulid)
                .map_err(|_| TypeError::IdExhausted),
        }
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("strategy", &self.strategy)
            .field("next_int", &self.next_int)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// OwnerKey
// ---------------------------------------------------------------------------

/// Polymorphic reference to the entity that owns a set of metadata records.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerKey {
    pub owner_type: String,
    pub owner_id: EntityId,
}

impl OwnerKey {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<EntityId>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner_type, self.owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_any_prefers_integers() {
        assert_eq!(EntityId::parse_any("42").unwrap(), EntityId::Int(42));
        let uuid = Uuid::now_v7();
        assert_eq!(
            EntityId::parse_any(&uuid.to_string()).unwrap(),
            EntityId::Uuid(uuid)
        );
        let ulid = Ulid::new();
        assert_eq!(
            EntityId::parse_any(&ulid.to_string()).unwrap(),
            EntityId::Ulid(ulid)
        );
        assert!(EntityId::parse_any("not-an-id").is_err());
    }

    #[test]
    fn strategy_parse_is_strict() {
        assert!(IdStrategy::Integer.parse("12").is_ok());
        assert!(IdStrategy::Integer.parse("abc").is_err());
        assert!(IdStrategy::Uuid.parse("12").is_err());
        assert!(IdStrategy::Ulid.parse(&Uuid::now_v7().to_string()).is_err());
    }

    #[test]
    fn generators_are_monotonic() {
        for strategy in [IdStrategy::Integer, IdStrategy::Uuid, IdStrategy::Ulid] {
            let mut gen = IdGenerator::new(strategy);
            let mut last = gen.next_id().unwrap();
            for _ in 0..200 {
                let next = gen.next_id().unwrap();
                assert!(next > last, "{strategy} ids must increase");
                assert_eq!(next.strategy(), strategy);
                last = next;
            }
        }
    }

    #[test]
    fn json_form() {
        assert_eq!(EntityId::Int(7).to_json(), serde_json::json!(7));
        let ulid = EntityId::Ulid(Ulid::new());
        assert_eq!(EntityId::from_json(&ulid.to_json()), Some(ulid));
        assert_eq!(EntityId::from_json(&serde_json::Value::Null), None);
    }

    #[test]
    fn serde_roundtrip() {
        let ids = vec![EntityId::Int(3), EntityId::Uuid(Uuid::now_v7())];
        let json = serde_json::to_string(&ids).unwrap();
        let parsed: Vec<EntityId> = serde_json::from_str(&json).unwrap();
        assert_eq!(ids, parsed);
    }

    #[test]
    fn strategy_from_str() {
        assert_eq!("ULID".parse::<IdStrategy>().unwrap(), IdStrategy::Ulid);
        assert!("serial".parse::<IdStrategy>().is_err());
        assert!(IdStrategy::Uuid.is_client_generated());
        assert!(!IdStrategy::Integer.is_client_generated());
    }

    #[test]
    fn owner_key_display() {
        let owner = OwnerKey::new("user", 9);
        assert_eq!(owner.to_string(), "user#9");
    }
}
