//! Field descriptors and the semantic-type operator table.

use serde::{Deserialize, Serialize};

/// Semantic type of an entity field.
///
/// Decides how literals are coerced and which filter operators are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SemanticType {
    Identifier,
    String,
    Integer,
    BigInteger,
    Bytes,
    Timestamp,
    Boolean,
    Enum,
    Reference,
}

impl SemanticType {
    /// Operators a field of this type gets when none are declared.
    pub fn default_operators(self) -> &'static [Operator] {
        use Operator::*;
        match self {
            SemanticType::Identifier
            | SemanticType::Bytes
            | SemanticType::Boolean
            | SemanticType::Enum
            | SemanticType::Reference => &[Eq, In],
            SemanticType::String => &[Eq, In, Contains, StartsWith, EndsWith],
            SemanticType::Integer | SemanticType::BigInteger => &[Eq, In, Gt, Gte, Lt, Lte],
            SemanticType::Timestamp => &[Eq, Gt, Gte, Lt, Lte],
        }
    }

    /// Whether a field of this type may declare `op` at all.
    ///
    /// `all` is the soft-delete toggle and is only meaningful on timestamps.
    pub fn permits(self, op: Operator) -> bool {
        match (self, op) {
            (SemanticType::Timestamp, Operator::All) => true,
            (SemanticType::Timestamp, Operator::In) => true,
            _ => self.default_operators().contains(&op),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SemanticType::Identifier => "Identifier",
            SemanticType::String => "String",
            SemanticType::Integer => "Integer",
            SemanticType::BigInteger => "BigInteger",
            SemanticType::Bytes => "Bytes",
            SemanticType::Timestamp => "Timestamp",
            SemanticType::Boolean => "Boolean",
            SemanticType::Enum => "Enum",
            SemanticType::Reference => "Reference",
        }
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter operator, written as the suffix of a where-clause key
/// (`value_gte`, `comment_startsWith`, `deletedAt_all`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "gt")]
    Gt,
    #[serde(rename = "gte")]
    Gte,
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "lte")]
    Lte,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "all")]
    All,
}

impl Operator {
    pub const ALL_OPERATORS: [Operator; 10] = [
        Operator::Eq,
        Operator::In,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::In => "in",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::All => "all",
        }
    }

    /// Parse a where-clause key suffix. Matching is exact (case-sensitive).
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL_OPERATORS
            .into_iter()
            .find(|op| op.as_str() == suffix)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one entity field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub nullable: bool,
    /// Empty means "the type's default operators".
    #[serde(default)]
    pub supported_operators: Vec<Operator>,
    /// Allowed values for [`SemanticType::Enum`] fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
    /// Target entity for [`SemanticType::Reference`] fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl FieldDescriptor {
    /// A required field with the type's default operators.
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            nullable: false,
            supported_operators: semantic_type.default_operators().to_vec(),
            variants: Vec::new(),
            references: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_operators(mut self, operators: &[Operator]) -> Self {
        self.supported_operators = operators.to_vec();
        self
    }

    pub fn with_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }

    pub fn references(mut self, entity: impl Into<String>) -> Self {
        self.references = Some(entity.into());
        self
    }

    pub fn supports(&self, op: Operator) -> bool {
        self.supported_operators.contains(&op)
    }

    /// Same storage shape; operator lists are allowed to differ.
    pub(crate) fn same_shape(&self, other: &FieldDescriptor) -> bool {
        self.name == other.name
            && self.semantic_type == other.semantic_type
            && self.nullable == other.nullable
            && self.variants == other.variants
            && self.references == other.references
    }
}
