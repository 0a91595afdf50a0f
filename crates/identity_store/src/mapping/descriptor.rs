use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use aideon_identity_core::{ModelProperty, RowShape, TypeHierarchy};

/// Role a row shape plays in the persistence of the model.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RowKind {
    /// Root and joined rows of partitions, identity types and relationships.
    Managed,
    Attribute,
    RelationshipMember,
    Credential,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OwnerTarget {
    /// References the identifier of a row of the named row type.
    Row(String),
    /// Holds the owner's identifier as plain text with no row behind it.
    Identifier,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OwnerBinding {
    pub column: String,
    pub target: OwnerTarget,
    /// Model property holding the owner, when the owner is not the instance itself.
    pub property: Option<ModelProperty>,
}

impl OwnerBinding {
    pub fn row(column: impl Into<String>, row_type: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            target: OwnerTarget::Row(row_type.into()),
            property: None,
        }
    }

    pub fn identifier(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            target: OwnerTarget::Identifier,
            property: None,
        }
    }

    pub fn owner_row_type(&self) -> Option<&str> {
        match &self.target {
            OwnerTarget::Row(row_type) => Some(row_type.as_str()),
            OwnerTarget::Identifier => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingDescriptor {
    pub supported_types: IndexSet<String>,
    pub owner: Option<OwnerBinding>,
    pub discriminator: Option<String>,
    #[serde(with = "indexmap::map::serde_seq")]
    pub bindings: IndexMap<ModelProperty, String>,
    pub is_root: bool,
    pub is_persist: bool,
}

impl MappingDescriptor {
    pub fn root<I, S>(supported_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported_types: supported_types.into_iter().map(Into::into).collect(),
            owner: None,
            discriminator: None,
            bindings: IndexMap::new(),
            is_root: true,
            is_persist: true,
        }
    }

    pub fn secondary<I, S>(supported_types: I, owner: OwnerBinding) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owner: Some(owner),
            is_root: false,
            ..Self::root(supported_types)
        }
    }

    pub fn bind(mut self, property: ModelProperty, column: impl Into<String>) -> Self {
        self.bindings.insert(property, column.into());
        self
    }

    pub fn bind_named(self, property: &str, column: impl Into<String>) -> Self {
        self.bind(ModelProperty::named(property), column)
    }

    pub fn discriminator(mut self, column: impl Into<String>) -> Self {
        self.discriminator = Some(column.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.is_persist = false;
        self
    }

    pub fn column_for(&self, property: &ModelProperty) -> Option<&str> {
        self.bindings.get(property).map(String::as_str)
    }

    /// Lineage distance from `model_type` to the nearest supported type.
    pub fn support_distance(&self, hierarchy: &TypeHierarchy, model_type: &str) -> Option<usize> {
        hierarchy
            .lineage(model_type)
            .iter()
            .position(|ancestor| self.supported_types.contains(*ancestor))
    }

    pub fn supports(&self, hierarchy: &TypeHierarchy, model_type: &str) -> bool {
        self.support_distance(hierarchy, model_type).is_some()
    }
}

/// Declaration of one row shape and the descriptors binding it to model types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowDeclaration {
    pub shape: RowShape,
    pub kind: RowKind,
    pub descriptors: Vec<MappingDescriptor>,
}

impl RowDeclaration {
    pub fn new(shape: RowShape, kind: RowKind) -> Self {
        Self {
            shape,
            kind,
            descriptors: Vec::new(),
        }
    }

    pub fn describe(mut self, descriptor: MappingDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}

/// A configured row shape. Built once by the registry and read only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityMapper {
    pub shape: RowShape,
    pub kind: RowKind,
    pub descriptors: Vec<MappingDescriptor>,
}

impl EntityMapper {
    pub fn row_type(&self) -> &str {
        &self.shape.row_type
    }

    /// Most specific descriptor supporting `model_type`.
    pub fn descriptor_for(
        &self,
        hierarchy: &TypeHierarchy,
        model_type: &str,
    ) -> Option<&MappingDescriptor> {
        self.descriptors
            .iter()
            .filter_map(|descriptor| {
                descriptor
                    .support_distance(hierarchy, model_type)
                    .map(|distance| (distance, descriptor))
            })
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, descriptor)| descriptor)
    }

    /// Descriptor supporting `model_type` or, failing that, one of its subtypes.
    pub fn descriptor_covering(
        &self,
        hierarchy: &TypeHierarchy,
        model_type: &str,
    ) -> Option<&MappingDescriptor> {
        self.descriptor_for(hierarchy, model_type).or_else(|| {
            self.descriptors.iter().find(|descriptor| {
                descriptor
                    .supported_types
                    .iter()
                    .any(|supported| hierarchy.is_assignable(model_type, supported))
            })
        })
    }

    pub fn is_root_for(&self, hierarchy: &TypeHierarchy, model_type: &str) -> bool {
        self.descriptor_covering(hierarchy, model_type)
            .is_some_and(|descriptor| descriptor.is_root)
    }

    pub fn owner(&self) -> Option<&OwnerBinding> {
        self.descriptors
            .iter()
            .find_map(|descriptor| descriptor.owner.as_ref())
    }

    /// First column bound to `property` by any descriptor.
    pub fn bound_column(&self, property: &ModelProperty) -> Option<&str> {
        self.descriptors
            .iter()
            .find_map(|descriptor| descriptor.column_for(property))
    }

    pub fn discriminator(&self) -> Option<&str> {
        self.descriptors
            .iter()
            .find_map(|descriptor| descriptor.discriminator.as_deref())
    }
}

impl From<RowDeclaration> for EntityMapper {
    fn from(value: RowDeclaration) -> Self {
        Self {
            shape: value.shape,
            kind: value.kind,
            descriptors: value.descriptors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aideon_identity_core::{ACCOUNT, ColumnKind, IDENTITY_TYPE, ROLE, USER};

    fn identity_mapper() -> EntityMapper {
        RowDeclaration::new(
            RowShape::new("idm_identity_type", "id").column("type_name", ColumnKind::Text),
            RowKind::Managed,
        )
        .describe(MappingDescriptor::root([IDENTITY_TYPE]).discriminator("type_name"))
        .describe(
            MappingDescriptor::secondary([ACCOUNT], OwnerBinding::row("id", "idm_identity_type"))
                .read_only(),
        )
        .into()
    }

    #[test]
    fn descriptor_for_prefers_nearest_supported_type() {
        let hierarchy = TypeHierarchy::builtin();
        let mapper = identity_mapper();
        let descriptor = mapper.descriptor_for(&hierarchy, USER).expect("descriptor");
        assert!(descriptor.supported_types.contains(ACCOUNT));
        let descriptor = mapper.descriptor_for(&hierarchy, ROLE).expect("descriptor");
        assert!(descriptor.is_root);
    }

    #[test]
    fn covering_descriptor_reaches_subtypes_of_a_base() {
        let hierarchy = TypeHierarchy::builtin();
        let mapper: EntityMapper =
            RowDeclaration::new(RowShape::new("idm_role", "id"), RowKind::Managed)
                .describe(MappingDescriptor::secondary(
                    [ROLE],
                    OwnerBinding::row("id", "idm_identity_type"),
                ))
                .into();
        assert!(mapper.descriptor_for(&hierarchy, IDENTITY_TYPE).is_none());
        assert!(mapper.descriptor_covering(&hierarchy, IDENTITY_TYPE).is_some());
        assert!(!mapper.is_root_for(&hierarchy, ROLE));
    }
}
