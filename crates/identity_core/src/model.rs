use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Id, IdentityError, IdentityResult, Timestamp, Value};

pub const ATTRIBUTED_TYPE: &str = "AttributedType";
pub const PARTITION: &str = "Partition";
pub const IDENTITY_TYPE: &str = "IdentityType";
pub const RELATIONSHIP: &str = "Relationship";
pub const ATTRIBUTE: &str = "Attribute";
pub const CREDENTIAL_STORAGE: &str = "CredentialStorage";

pub const REALM: &str = "Realm";
pub const TIER: &str = "Tier";
pub const ACCOUNT: &str = "Account";
pub const AGENT: &str = "Agent";
pub const USER: &str = "User";
pub const ROLE: &str = "Role";
pub const GROUP: &str = "Group";
pub const GRANT: &str = "Grant";
pub const GROUP_MEMBERSHIP: &str = "GroupMembership";
pub const GROUP_ROLE: &str = "GroupRole";
pub const ENCODED_PASSWORD_STORAGE: &str = "EncodedPasswordStorage";
pub const DIGEST_CREDENTIAL_STORAGE: &str = "DigestCredentialStorage";
pub const OTP_CREDENTIAL_STORAGE: &str = "OTPCredentialStorage";

pub const PROP_NAME: &str = "name";
pub const PROP_PARTITION: &str = "partition";
pub const PROP_CREATED_DATE: &str = "createdDate";
pub const PROP_EXPIRATION_DATE: &str = "expirationDate";
pub const PROP_ENABLED: &str = "enabled";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BaseKind {
    Partition,
    IdentityType,
    Relationship,
    Attribute,
    CredentialStorage,
}

impl BaseKind {
    pub fn type_name(self) -> &'static str {
        match self {
            BaseKind::Partition => PARTITION,
            BaseKind::IdentityType => IDENTITY_TYPE,
            BaseKind::Relationship => RELATIONSHIP,
            BaseKind::Attribute => ATTRIBUTE,
            BaseKind::CredentialStorage => CREDENTIAL_STORAGE,
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            PARTITION => Some(BaseKind::Partition),
            IDENTITY_TYPE => Some(BaseKind::IdentityType),
            RELATIONSHIP => Some(BaseKind::Relationship),
            ATTRIBUTE => Some(BaseKind::Attribute),
            CREDENTIAL_STORAGE => Some(BaseKind::CredentialStorage),
            _ => None,
        }
    }

    /// Bases that a query may target to mean "every subtype".
    pub fn is_queryable_base(name: &str) -> bool {
        matches!(name, PARTITION | IDENTITY_TYPE | RELATIONSHIP)
    }
}

/// Model type names and their single-parent lineage.
#[derive(Clone, Debug)]
pub struct TypeHierarchy {
    parents: HashMap<String, Option<String>>,
}

impl TypeHierarchy {
    pub fn bases() -> Self {
        let mut parents = HashMap::new();
        parents.insert(ATTRIBUTED_TYPE.to_string(), None);
        for base in [PARTITION, IDENTITY_TYPE, RELATIONSHIP] {
            parents.insert(base.to_string(), Some(ATTRIBUTED_TYPE.to_string()));
        }
        parents.insert(ATTRIBUTE.to_string(), None);
        parents.insert(CREDENTIAL_STORAGE.to_string(), None);
        Self { parents }
    }

    pub fn builtin() -> Self {
        let mut hierarchy = Self::bases();
        for (name, parent) in [
            (REALM, PARTITION),
            (TIER, PARTITION),
            (ACCOUNT, IDENTITY_TYPE),
            (AGENT, ACCOUNT),
            (USER, AGENT),
            (ROLE, IDENTITY_TYPE),
            (GROUP, IDENTITY_TYPE),
            (GRANT, RELATIONSHIP),
            (GROUP_MEMBERSHIP, RELATIONSHIP),
            (GROUP_ROLE, RELATIONSHIP),
            (ENCODED_PASSWORD_STORAGE, CREDENTIAL_STORAGE),
            (DIGEST_CREDENTIAL_STORAGE, CREDENTIAL_STORAGE),
            (OTP_CREDENTIAL_STORAGE, CREDENTIAL_STORAGE),
        ] {
            hierarchy
                .parents
                .insert(name.to_string(), Some(parent.to_string()));
        }
        hierarchy
    }

    pub fn register(&mut self, name: impl Into<String>, parent: &str) -> IdentityResult<()> {
        let name = name.into();
        if !self.contains(parent) {
            return Err(IdentityError::invalid(format!(
                "cannot register [{name}]: unknown parent type [{parent}]"
            )));
        }
        if self.contains(&name) {
            return Err(IdentityError::invalid(format!(
                "type [{name}] is already registered"
            )));
        }
        self.parents.insert(name, Some(parent.to_string()));
        Ok(())
    }

    pub fn with_type(mut self, name: impl Into<String>, parent: &str) -> IdentityResult<Self> {
        self.register(name, parent)?;
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    pub fn parent(&self, name: &str) -> Option<&str> {
        self.parents.get(name).and_then(|parent| parent.as_deref())
    }

    /// The type itself followed by each ancestor, nearest first.
    pub fn lineage<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let mut lineage = Vec::new();
        let mut current = Some(name);
        while let Some(type_name) = current {
            if lineage.contains(&type_name) {
                break;
            }
            lineage.push(type_name);
            current = self.parent(type_name);
        }
        lineage
    }

    pub fn is_assignable(&self, ancestor: &str, descendant: &str) -> bool {
        self.lineage(descendant).contains(&ancestor)
    }

    pub fn base_kind(&self, name: &str) -> Option<BaseKind> {
        self.lineage(name)
            .into_iter()
            .find_map(BaseKind::from_type_name)
    }

    pub fn subtypes_of<'a>(&'a self, ancestor: &'a str) -> Vec<&'a str> {
        let mut subtypes: Vec<&str> = self
            .parents
            .keys()
            .map(String::as_str)
            .filter(|name| *name != ancestor && self.is_assignable(ancestor, name))
            .collect();
        subtypes.sort_unstable();
        subtypes
    }
}

impl Default for TypeHierarchy {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Value(Value),
    Type(Box<AttributedType>),
}

impl PropertyValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PropertyValue::Value(value) => Some(value),
            PropertyValue::Type(_) => None,
        }
    }

    pub fn as_type(&self) -> Option<&AttributedType> {
        match self {
            PropertyValue::Type(value) => Some(value),
            PropertyValue::Value(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Value(Value::Null))
    }
}

macro_rules! property_value_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for PropertyValue {
                fn from(value: $source) -> Self {
                    PropertyValue::Value(value.into())
                }
            }
        )*
    };
}

property_value_from!(Value, &str, String, i64, f64, bool, Timestamp, Vec<u8>, Id);

impl From<AttributedType> for PropertyValue {
    fn from(value: AttributedType) -> Self {
        PropertyValue::Type(Box::new(value))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Value,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A partition, identity type or relationship instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributedType {
    pub model_type: String,
    pub id: Id,
    pub properties: IndexMap<String, PropertyValue>,
    pub attributes: IndexMap<String, Attribute>,
    /// Member tokens, present when members are stored as formatted references.
    pub reference: Option<RelationshipReference>,
}

impl AttributedType {
    pub fn new(model_type: impl Into<String>) -> Self {
        Self::with_id(model_type, Id::new())
    }

    pub fn with_id(model_type: impl Into<String>, id: Id) -> Self {
        Self {
            model_type: model_type.into(),
            id,
            properties: IndexMap::new(),
            attributes: IndexMap::new(),
            reference: None,
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        let name = name.into();
        let value = value.into();
        if value.is_null() {
            self.properties.shift_remove(&name);
        } else {
            self.properties.insert(name, value);
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.property(name).and_then(PropertyValue::as_value)
    }

    pub fn reference_to(&self, name: &str) -> Option<&AttributedType> {
        self.property(name).and_then(PropertyValue::as_type)
    }

    pub fn partition(&self) -> Option<&AttributedType> {
        self.reference_to(PROP_PARTITION)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.name.clone(), attribute);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.shift_remove(name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialStorage {
    pub storage_type: String,
    pub effective_date: Timestamp,
    pub expiry_date: Option<Timestamp>,
    pub properties: IndexMap<String, Value>,
}

impl CredentialStorage {
    pub fn new(storage_type: impl Into<String>) -> Self {
        Self {
            storage_type: storage_type.into(),
            effective_date: Timestamp::now(),
            expiry_date: None,
            properties: IndexMap::new(),
        }
    }

    pub fn effective_at(mut self, effective_date: Timestamp) -> Self {
        self.effective_date = effective_date;
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Model-side end of a property binding.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ModelProperty {
    Identifier,
    Named(String),
    ConfigurationName,
    AttributeName,
    AttributeValue,
    MemberReference,
    MemberDescriptor,
    EffectiveDate,
    ExpiryDate,
}

impl ModelProperty {
    pub fn named(name: impl Into<String>) -> Self {
        ModelProperty::Named(name.into())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ModelProperty::Named(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ModelProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelProperty::Identifier => write!(f, "@identifier"),
            ModelProperty::Named(name) => write!(f, "{name}"),
            ModelProperty::ConfigurationName => write!(f, "@configuration-name"),
            ModelProperty::AttributeName => write!(f, "@attribute-name"),
            ModelProperty::AttributeValue => write!(f, "@attribute-value"),
            ModelProperty::MemberReference => write!(f, "@member"),
            ModelProperty::MemberDescriptor => write!(f, "@member-descriptor"),
            ModelProperty::EffectiveDate => write!(f, "@effective-date"),
            ModelProperty::ExpiryDate => write!(f, "@expiry-date"),
        }
    }
}

/// Reads and writes bound properties on model instances.
pub trait PropertyAccess {
    fn read(&self, property: &ModelProperty) -> Option<PropertyValue>;
    fn write(&mut self, property: &ModelProperty, value: PropertyValue) -> IdentityResult<()>;
}

impl PropertyAccess for AttributedType {
    fn read(&self, property: &ModelProperty) -> Option<PropertyValue> {
        match property {
            ModelProperty::Identifier => Some(PropertyValue::Value(self.id.into())),
            ModelProperty::Named(name) => self.properties.get(name).cloned(),
            _ => None,
        }
    }

    fn write(&mut self, property: &ModelProperty, value: PropertyValue) -> IdentityResult<()> {
        match property {
            ModelProperty::Identifier => {
                let text = value
                    .as_value()
                    .and_then(Value::as_str)
                    .ok_or_else(|| IdentityError::invalid("identifier must be text"))?;
                self.id = Id::parse(text)?;
            }
            ModelProperty::Named(name) => self.set(name.clone(), value),
            other => {
                return Err(IdentityError::invalid(format!(
                    "{other} cannot be written to {} [{}]",
                    self.model_type, self.id
                )));
            }
        }
        Ok(())
    }
}

impl PropertyAccess for CredentialStorage {
    fn read(&self, property: &ModelProperty) -> Option<PropertyValue> {
        match property {
            ModelProperty::EffectiveDate => Some(Value::Time(self.effective_date).into()),
            ModelProperty::ExpiryDate => Some(Value::from(self.expiry_date).into()),
            ModelProperty::Named(name) => self.properties.get(name).cloned().map(Into::into),
            _ => None,
        }
    }

    fn write(&mut self, property: &ModelProperty, value: PropertyValue) -> IdentityResult<()> {
        let PropertyValue::Value(value) = value else {
            return Err(IdentityError::invalid(format!(
                "credential property {property} cannot hold a model type"
            )));
        };
        match property {
            ModelProperty::EffectiveDate => {
                self.effective_date = value
                    .as_time()
                    .ok_or_else(|| IdentityError::invalid("effective date must be a timestamp"))?;
            }
            ModelProperty::ExpiryDate => self.expiry_date = value.as_time(),
            ModelProperty::Named(name) => {
                if value.is_null() {
                    self.properties.shift_remove(name);
                } else {
                    self.properties.insert(name.clone(), value);
                }
            }
            other => {
                return Err(IdentityError::invalid(format!(
                    "{other} cannot be written to a {} credential",
                    self.storage_type
                )));
            }
        }
        Ok(())
    }
}

const REFERENCE_SEPARATOR: char = ':';

/// Parsed form of a formatted member token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityReference {
    pub model_type: String,
    pub partition_id: Option<Id>,
    pub id: Id,
}

/// Member tokens of a relationship whose members live outside this store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipReference {
    pub identity_references: IndexMap<String, String>,
}

impl RelationshipReference {
    pub fn format_id(identity: &AttributedType) -> String {
        let partition = identity
            .partition()
            .map(|partition| partition.id.to_string())
            .unwrap_or_default();
        format!(
            "{}{REFERENCE_SEPARATOR}{partition}{REFERENCE_SEPARATOR}{}",
            identity.model_type, identity.id
        )
    }

    pub fn parse_id(token: &str) -> IdentityResult<IdentityReference> {
        let mut parts = token.splitn(3, REFERENCE_SEPARATOR);
        let (Some(model_type), Some(partition), Some(id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(IdentityError::invalid(format!(
                "malformed identity reference '{token}'"
            )));
        };
        if model_type.is_empty() {
            return Err(IdentityError::invalid(format!(
                "identity reference '{token}' has no type"
            )));
        }
        let partition_id = if partition.is_empty() {
            None
        } else {
            Some(Id::parse(partition)?)
        };
        Ok(IdentityReference {
            model_type: model_type.to_string(),
            partition_id,
            id: Id::parse(id)?,
        })
    }

    pub fn add_identity_reference(
        &mut self,
        descriptor: impl Into<String>,
        token: impl Into<String>,
    ) {
        self.identity_references.insert(descriptor.into(), token.into());
    }

    pub fn identity_reference(&self, descriptor: &str) -> Option<&str> {
        self.identity_references.get(descriptor).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lineage_walks_to_base() {
        let hierarchy = TypeHierarchy::builtin();
        assert_eq!(
            hierarchy.lineage(USER),
            vec![USER, AGENT, ACCOUNT, IDENTITY_TYPE, ATTRIBUTED_TYPE]
        );
        assert!(hierarchy.is_assignable(IDENTITY_TYPE, USER));
        assert!(hierarchy.is_assignable(USER, USER));
        assert!(!hierarchy.is_assignable(USER, ROLE));
        assert_eq!(hierarchy.base_kind(GRANT), Some(BaseKind::Relationship));
        assert_eq!(
            hierarchy.base_kind(ENCODED_PASSWORD_STORAGE),
            Some(BaseKind::CredentialStorage)
        );
        assert_eq!(hierarchy.base_kind("Widget"), None);
    }

    #[test]
    fn register_requires_known_parent_and_new_name() {
        let mut hierarchy = TypeHierarchy::builtin();
        hierarchy.register("Device", IDENTITY_TYPE).expect("register");
        assert!(hierarchy.is_assignable(IDENTITY_TYPE, "Device"));
        assert!(hierarchy.register("Device", IDENTITY_TYPE).is_err());
        assert!(hierarchy.register("Orphan", "Missing").is_err());
    }

    #[test]
    fn subtypes_are_sorted_and_exclude_self() {
        let hierarchy = TypeHierarchy::builtin();
        assert_eq!(hierarchy.subtypes_of(ACCOUNT), vec![AGENT, USER]);
    }

    #[test]
    fn null_properties_are_removed() {
        let mut user = AttributedType::new(USER).with("loginName", "alice");
        user.set("loginName", Value::Null);
        assert!(user.property("loginName").is_none());
    }

    #[test]
    fn attributed_type_accessors_bind_identifier_and_named() {
        let mut user = AttributedType::new(USER);
        let id = Id::new();
        user.write(&ModelProperty::Identifier, Value::from(id).into())
            .expect("id");
        user.write(&ModelProperty::named("loginName"), "bob".into())
            .expect("name");
        assert_eq!(user.id, id);
        assert_eq!(
            user.read(&ModelProperty::named("loginName")),
            Some(PropertyValue::from("bob"))
        );
        assert!(user.read(&ModelProperty::ConfigurationName).is_none());
        assert!(
            user.write(&ModelProperty::Identifier, Value::I64(1).into())
                .is_err()
        );
        let err = user
            .write(&ModelProperty::ConfigurationName, "cfg".into())
            .expect_err("configuration name");
        assert!(matches!(err, IdentityError::Validation { .. }));
        assert!(
            user.write(&ModelProperty::EffectiveDate, Value::Time(Timestamp(1)).into())
                .is_err()
        );
    }

    #[test]
    fn credential_accessors_bind_dates() {
        let mut storage = CredentialStorage::new(ENCODED_PASSWORD_STORAGE);
        storage
            .write(&ModelProperty::EffectiveDate, Value::Time(Timestamp(5)).into())
            .expect("effective");
        storage
            .write(&ModelProperty::named("encodedHash"), "abc".into())
            .expect("hash");
        assert_eq!(storage.effective_date, Timestamp(5));
        assert_eq!(storage.value("encodedHash"), Some(&Value::from("abc")));
        let err = storage
            .write(
                &ModelProperty::named("owner"),
                AttributedType::new(USER).into(),
            )
            .expect_err("model type");
        assert!(matches!(err, IdentityError::Validation { .. }));
        let err = storage
            .write(&ModelProperty::AttributeName, "name".into())
            .expect_err("attribute name");
        assert!(matches!(err, IdentityError::Validation { .. }));
    }

    #[test]
    fn relationship_reference_tokens_roundtrip() {
        let realm = AttributedType::new(REALM);
        let user = AttributedType::new(USER).with(PROP_PARTITION, realm.clone());
        let token = RelationshipReference::format_id(&user);
        let parsed = RelationshipReference::parse_id(&token).expect("parse");
        assert_eq!(parsed.model_type, USER);
        assert_eq!(parsed.partition_id, Some(realm.id));
        assert_eq!(parsed.id, user.id);

        let detached = AttributedType::new(ROLE);
        let parsed = RelationshipReference::parse_id(&RelationshipReference::format_id(&detached))
            .expect("parse");
        assert_eq!(parsed.partition_id, None);
        assert!(RelationshipReference::parse_id("garbage").is_err());
    }
}
