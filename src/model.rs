//! Graph data model: entities, relations, conflicts, provenance,
//! corrections, versions.
//!
//! Records are plain owned structs. Optional behaviors that the original
//! design hid in untyped attributes (`manualOverride`, `booknlp_id`,
//! `rejected`, `source`) are first-class typed fields here.

use crate::identity::Eid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Person,
    Place,
    Org,
    Event,
    Date,
    Item,
    Work,
    Species,
    House,
    Tribe,
    Title,
    Race,
    Creature,
    Artifact,
    Technology,
    Magic,
    Language,
    Currency,
    Material,
    Drug,
    Deity,
    Ability,
    Skill,
    Power,
    Technique,
    Spell,
    Misc,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Place => "PLACE",
            EntityType::Org => "ORG",
            EntityType::Event => "EVENT",
            EntityType::Date => "DATE",
            EntityType::Item => "ITEM",
            EntityType::Work => "WORK",
            EntityType::Species => "SPECIES",
            EntityType::House => "HOUSE",
            EntityType::Tribe => "TRIBE",
            EntityType::Title => "TITLE",
            EntityType::Race => "RACE",
            EntityType::Creature => "CREATURE",
            EntityType::Artifact => "ARTIFACT",
            EntityType::Technology => "TECHNOLOGY",
            EntityType::Magic => "MAGIC",
            EntityType::Language => "LANGUAGE",
            EntityType::Currency => "CURRENCY",
            EntityType::Material => "MATERIAL",
            EntityType::Drug => "DRUG",
            EntityType::Deity => "DEITY",
            EntityType::Ability => "ABILITY",
            EntityType::Skill => "SKILL",
            EntityType::Power => "POWER",
            EntityType::Technique => "TECHNIQUE",
            EntityType::Spell => "SPELL",
            EntityType::Misc => "MISC",
        }
    }

    pub fn parse(name: &str) -> Option<EntityType> {
        match name.to_uppercase().as_str() {
            "PERSON" => Some(EntityType::Person),
            "PLACE" | "GPE" | "LOC" | "LOCATION" => Some(EntityType::Place),
            "ORG" | "ORGANIZATION" => Some(EntityType::Org),
            "EVENT" => Some(EntityType::Event),
            "DATE" => Some(EntityType::Date),
            "ITEM" => Some(EntityType::Item),
            "WORK" => Some(EntityType::Work),
            "SPECIES" => Some(EntityType::Species),
            "HOUSE" => Some(EntityType::House),
            "TRIBE" => Some(EntityType::Tribe),
            "TITLE" => Some(EntityType::Title),
            "RACE" => Some(EntityType::Race),
            "CREATURE" => Some(EntityType::Creature),
            "ARTIFACT" => Some(EntityType::Artifact),
            "TECHNOLOGY" => Some(EntityType::Technology),
            "MAGIC" => Some(EntityType::Magic),
            "LANGUAGE" => Some(EntityType::Language),
            "CURRENCY" => Some(EntityType::Currency),
            "MATERIAL" => Some(EntityType::Material),
            "DRUG" => Some(EntityType::Drug),
            "DEITY" => Some(EntityType::Deity),
            "ABILITY" => Some(EntityType::Ability),
            "SKILL" => Some(EntityType::Skill),
            "POWER" => Some(EntityType::Power),
            "TECHNIQUE" => Some(EntityType::Technique),
            "SPELL" => Some(EntityType::Spell),
            "MISC" => Some(EntityType::Misc),
            _ => None,
        }
    }

    /// Types whose lowercase-token gate in the normalizer may salvage the
    /// surface by Title-Casing instead of rejecting.
    pub fn is_salvage_eligible(&self) -> bool {
        matches!(
            self,
            EntityType::Person | EntityType::Org | EntityType::House | EntityType::Place
        )
    }

    /// Type compatibility for cross-document merging. Exact equality plus
    /// the documented relaxations; PLACE and ORG are never compatible.
    pub fn mergeable_with(&self, other: &EntityType) -> bool {
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (EntityType::Org, EntityType::House)
                | (EntityType::House, EntityType::Org)
                | (EntityType::Tribe, EntityType::House)
                | (EntityType::House, EntityType::Tribe)
        )
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed predicate set. Inverses and symmetry are part of the external
/// interface; consumers rely on the names staying stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    ParentOf,
    ChildOf,
    MarriedTo,
    SiblingOf,
    FriendsWith,
    AllyOf,
    EnemyOf,
    TraveledTo,
    BornIn,
    DiesIn,
    LivesIn,
    Rules,
    RuledBy,
    MemberOf,
    HasMember,
    LeaderOf,
    LedBy,
    Owns,
    OwnedBy,
    LocatedIn,
    Contains,
    Created,
    CreatedBy,
    Killed,
    KilledBy,
    Serves,
    ServedBy,
    Knows,
    WorksFor,
    Employs,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::ParentOf => "parent_of",
            Predicate::ChildOf => "child_of",
            Predicate::MarriedTo => "married_to",
            Predicate::SiblingOf => "sibling_of",
            Predicate::FriendsWith => "friends_with",
            Predicate::AllyOf => "ally_of",
            Predicate::EnemyOf => "enemy_of",
            Predicate::TraveledTo => "traveled_to",
            Predicate::BornIn => "born_in",
            Predicate::DiesIn => "dies_in",
            Predicate::LivesIn => "lives_in",
            Predicate::Rules => "rules",
            Predicate::RuledBy => "ruled_by",
            Predicate::MemberOf => "member_of",
            Predicate::HasMember => "has_member",
            Predicate::LeaderOf => "leader_of",
            Predicate::LedBy => "led_by",
            Predicate::Owns => "owns",
            Predicate::OwnedBy => "owned_by",
            Predicate::LocatedIn => "located_in",
            Predicate::Contains => "contains",
            Predicate::Created => "created",
            Predicate::CreatedBy => "created_by",
            Predicate::Killed => "killed",
            Predicate::KilledBy => "killed_by",
            Predicate::Serves => "serves",
            Predicate::ServedBy => "served_by",
            Predicate::Knows => "knows",
            Predicate::WorksFor => "works_for",
            Predicate::Employs => "employs",
        }
    }

    /// The inverse predicate, when one is defined. Symmetric predicates are
    /// their own inverse.
    pub fn inverse(&self) -> Option<Predicate> {
        match self {
            Predicate::ParentOf => Some(Predicate::ChildOf),
            Predicate::ChildOf => Some(Predicate::ParentOf),
            Predicate::MarriedTo => Some(Predicate::MarriedTo),
            Predicate::SiblingOf => Some(Predicate::SiblingOf),
            Predicate::FriendsWith => Some(Predicate::FriendsWith),
            Predicate::AllyOf => Some(Predicate::AllyOf),
            Predicate::EnemyOf => Some(Predicate::EnemyOf),
            Predicate::TraveledTo => None,
            Predicate::BornIn => None,
            Predicate::DiesIn => None,
            Predicate::LivesIn => None,
            Predicate::Rules => Some(Predicate::RuledBy),
            Predicate::RuledBy => Some(Predicate::Rules),
            Predicate::MemberOf => Some(Predicate::HasMember),
            Predicate::HasMember => Some(Predicate::MemberOf),
            Predicate::LeaderOf => Some(Predicate::LedBy),
            Predicate::LedBy => Some(Predicate::LeaderOf),
            Predicate::Owns => Some(Predicate::OwnedBy),
            Predicate::OwnedBy => Some(Predicate::Owns),
            Predicate::LocatedIn => Some(Predicate::Contains),
            Predicate::Contains => Some(Predicate::LocatedIn),
            Predicate::Created => Some(Predicate::CreatedBy),
            Predicate::CreatedBy => Some(Predicate::Created),
            Predicate::Killed => Some(Predicate::KilledBy),
            Predicate::KilledBy => Some(Predicate::Killed),
            Predicate::Serves => Some(Predicate::ServedBy),
            Predicate::ServedBy => Some(Predicate::Serves),
            Predicate::Knows => Some(Predicate::Knows),
            Predicate::WorksFor => Some(Predicate::Employs),
            Predicate::Employs => Some(Predicate::WorksFor),
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            Predicate::MarriedTo
                | Predicate::SiblingOf
                | Predicate::FriendsWith
                | Predicate::AllyOf
                | Predicate::EnemyOf
                | Predicate::Knows
        )
    }

    /// Maximum distinct objects per subject before the conflict detector
    /// flags the predicate. None means unbounded.
    pub fn functional_limit(&self) -> Option<usize> {
        match self {
            Predicate::BornIn | Predicate::DiesIn | Predicate::KilledBy => Some(1),
            Predicate::ChildOf => Some(2),
            _ => None,
        }
    }

    /// Predicates whose objects may coexist only with disjoint time
    /// qualifiers.
    pub fn is_time_bounded(&self) -> bool {
        matches!(self, Predicate::Rules | Predicate::LivesIn)
    }

    pub fn parse(name: &str) -> Option<Predicate> {
        match name {
            "parent_of" => Some(Predicate::ParentOf),
            "child_of" => Some(Predicate::ChildOf),
            "married_to" => Some(Predicate::MarriedTo),
            "sibling_of" => Some(Predicate::SiblingOf),
            "friends_with" => Some(Predicate::FriendsWith),
            "ally_of" => Some(Predicate::AllyOf),
            "enemy_of" => Some(Predicate::EnemyOf),
            "traveled_to" => Some(Predicate::TraveledTo),
            "born_in" => Some(Predicate::BornIn),
            "dies_in" => Some(Predicate::DiesIn),
            "lives_in" => Some(Predicate::LivesIn),
            "rules" => Some(Predicate::Rules),
            "ruled_by" => Some(Predicate::RuledBy),
            "member_of" => Some(Predicate::MemberOf),
            "has_member" => Some(Predicate::HasMember),
            "leader_of" => Some(Predicate::LeaderOf),
            "led_by" => Some(Predicate::LedBy),
            "owns" => Some(Predicate::Owns),
            "owned_by" => Some(Predicate::OwnedBy),
            "located_in" => Some(Predicate::LocatedIn),
            "contains" => Some(Predicate::Contains),
            "created" => Some(Predicate::Created),
            "created_by" => Some(Predicate::CreatedBy),
            "killed" => Some(Predicate::Killed),
            "killed_by" => Some(Predicate::KilledBy),
            "serves" => Some(Predicate::Serves),
            "served_by" => Some(Predicate::ServedBy),
            "knows" => Some(Predicate::Knows),
            "works_for" => Some(Predicate::WorksFor),
            "employs" => Some(Predicate::Employs),
            _ => None,
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a mention came from. The variant drives the base confidence weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MentionSource {
    Whitelist,
    Ner,
    Dep,
    Pattern,
    Booknlp,
    Fallback,
}

impl MentionSource {
    pub fn base_weight(&self) -> f64 {
        match self {
            MentionSource::Whitelist => 0.95,
            MentionSource::Booknlp => 0.90,
            MentionSource::Ner => 0.85,
            MentionSource::Dep => 0.75,
            MentionSource::Pattern => 0.70,
            MentionSource::Fallback => 0.50,
        }
    }

    /// Priority when two sources claim the same token span. Higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            MentionSource::Whitelist => 5,
            MentionSource::Booknlp => 4,
            MentionSource::Ner => 3,
            MentionSource::Dep => 2,
            MentionSource::Pattern => 1,
            MentionSource::Fallback => 0,
        }
    }
}

/// Which extractor produced a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExtractorTag {
    Ner,
    Dep,
    Pattern,
    Manual,
    Booknlp,
}

/// A merged global entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub eid: Option<Eid>,
    pub entity_type: EntityType,
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub source: Option<MentionSource>,
    #[serde(default)]
    pub sense_path: Option<Vec<u16>>,
    #[serde(default)]
    pub manual_override: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub created_at: u64,
}

impl Entity {
    /// Add an alias, keeping the alias set case-fold unique and excluding
    /// the canonical itself.
    pub fn add_alias(&mut self, alias: &str) {
        let folded = alias.to_lowercase();
        if folded == self.canonical.to_lowercase() {
            return;
        }
        if self
            .aliases
            .iter()
            .any(|a| a.to_lowercase() == folded)
        {
            return;
        }
        self.aliases.push(alias.to_string());
    }
}

/// Exact quoted support for a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub doc_id: String,
    pub paragraph: usize,
    pub token_start: usize,
    pub token_len: usize,
    pub quote: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualifierKind {
    Time,
    Place,
    Manner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qualifier {
    pub kind: QualifierKind,
    pub value: String,
}

/// A typed binary relation between two entities in the same snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub qualifiers: Vec<Qualifier>,
    pub extractor: ExtractorTag,
    #[serde(default)]
    pub manual_override: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// A functional predicate has more than its allowed number of objects.
    FunctionalViolation,
    /// Time-bounded objects overlap (or lack disambiguating qualifiers).
    TemporalOverlap,
}

/// A contradiction found over the final relation set. Regenerated from
/// scratch after every merge; relations themselves are never modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: u8,
    pub description: String,
    pub relation_ids: Vec<String>,
}

/// Persistent link from a per-document local entity id to its current
/// global id. Append-only; remappings update `global_id` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub global_id: String,
    pub doc_id: String,
    pub merged_at: u64,
    pub local_canonical: String,
    pub entity_type: EntityType,
}

/// One entry in the version history: a doc append or a correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub correction_id: Option<String>,
    pub entity_count: usize,
    pub relation_count: usize,
}

/// One output entity of an `entity_split` correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSpec {
    pub canonical: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// The typed payload of a persisted user correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionKind {
    EntityType {
        target: String,
        from: EntityType,
        to: EntityType,
    },
    EntityMerge {
        primary: String,
        secondary: Vec<String>,
        #[serde(default)]
        canonical: Option<String>,
    },
    EntitySplit {
        target: String,
        into: Vec<SplitSpec>,
    },
    EntityReject {
        target: String,
    },
    EntityRestore {
        target: String,
    },
    RelationAdd {
        relation: Relation,
    },
    RelationRemove {
        relation_id: String,
    },
    RelationEdit {
        relation_id: String,
        #[serde(default)]
        predicate: Option<Predicate>,
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        qualifiers: Option<Vec<Qualifier>>,
    },
    AliasAdd {
        target: String,
        alias: String,
    },
    AliasRemove {
        target: String,
        alias: String,
    },
    CanonicalChange {
        target: String,
        canonical: String,
    },
}

/// A persisted, idempotent override of an extraction decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub id: String,
    #[serde(flatten)]
    pub kind: CorrectionKind,
    pub timestamp: u64,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub rolled_back: bool,
}

/// Snapshot-level bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub created_at: u64,
    pub updated_at: u64,
    pub entity_count: usize,
    pub relation_count: usize,
}

/// Merge statistics returned from a cross-document merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeStats {
    pub total_entities: usize,
    pub merged_clusters: usize,
    pub avg_confidence: f64,
    pub low_confidence_count: usize,
}

pub type ProvenanceMap = BTreeMap<String, ProvenanceEntry>;
