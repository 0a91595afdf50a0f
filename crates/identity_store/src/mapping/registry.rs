use std::collections::HashSet;

use indexmap::IndexMap;

use aideon_identity_core::{
    BaseKind, IdentityError, IdentityResult, ModelProperty, RowShape, TypeHierarchy,
};

use super::descriptor::{EntityMapper, MappingDescriptor, OwnerTarget, RowDeclaration, RowKind};

/// Ordered set of entity mappers. Owners and managed supertypes always precede the rows
/// that depend on them.
#[derive(Debug)]
pub struct EntityMapperRegistry {
    hierarchy: TypeHierarchy,
    mappers: Vec<EntityMapper>,
}

impl EntityMapperRegistry {
    pub fn configure(
        hierarchy: TypeHierarchy,
        declarations: Vec<RowDeclaration>,
    ) -> IdentityResult<Self> {
        let mut declared: IndexMap<String, RowDeclaration> = IndexMap::new();
        for declaration in declarations {
            let row_type = declaration.shape.row_type.clone();
            if declared.contains_key(&row_type) {
                return Err(IdentityError::integrity(format!(
                    "row type [{row_type}] is declared twice"
                )));
            }
            declared.insert(row_type, declaration);
        }
        for declaration in declared.values() {
            validate_declaration(&hierarchy, &declared, declaration)?;
        }

        let mut configurer = Configurer {
            declared: &declared,
            visiting: HashSet::new(),
            configured: HashSet::new(),
            mappers: Vec::with_capacity(declared.len()),
        };
        for row_type in declared.keys() {
            configurer.visit(row_type)?;
        }
        let registry = Self {
            hierarchy,
            mappers: configurer.mappers,
        };
        registry.validate_roots()?;
        registry.log_mappers();
        Ok(registry)
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn mappers(&self) -> &[EntityMapper] {
        &self.mappers
    }

    pub fn mappers_of_kind(&self, kind: RowKind) -> impl Iterator<Item = &EntityMapper> {
        self.mappers.iter().filter(move |mapper| mapper.kind == kind)
    }

    /// Every managed mapper taking part in `model_type`, root first.
    pub fn mappers_for(&self, model_type: &str) -> IdentityResult<Vec<&EntityMapper>> {
        let include_subtypes = BaseKind::is_queryable_base(model_type);
        let mut participating: Vec<&EntityMapper> = self
            .mappers_of_kind(RowKind::Managed)
            .filter(|mapper| {
                if include_subtypes {
                    mapper
                        .descriptor_covering(&self.hierarchy, model_type)
                        .is_some()
                } else {
                    mapper.descriptor_for(&self.hierarchy, model_type).is_some()
                }
            })
            .collect();
        let Some(root_index) = participating
            .iter()
            .enumerate()
            .filter_map(|(index, mapper)| {
                self.root_rank(mapper, model_type).map(|rank| (rank, index))
            })
            .min()
            .map(|(_, index)| index)
        else {
            return Err(IdentityError::no_mapper(format!(
                "no root mapper supports type [{model_type}]"
            )));
        };
        let root = participating.remove(root_index);
        participating.insert(0, root);
        Ok(participating)
    }

    pub fn root_mapper_for(&self, model_type: &str) -> IdentityResult<&EntityMapper> {
        let mappers = self.mappers_for(model_type)?;
        Ok(mappers[0])
    }

    /// Root mappers of `model_type` and, for the universal bases, of its subtypes.
    pub fn root_mappers_for(&self, model_type: &str) -> IdentityResult<Vec<&EntityMapper>> {
        let roots: Vec<&EntityMapper> = self
            .mappers_for(model_type)?
            .into_iter()
            .filter(|mapper| mapper.is_root_for(&self.hierarchy, model_type))
            .collect();
        Ok(roots)
    }

    pub fn mapper_for_row_type(&self, row_type: &str) -> IdentityResult<&EntityMapper> {
        self.mappers
            .iter()
            .find(|mapper| mapper.row_type() == row_type)
            .ok_or_else(|| IdentityError::no_mapper(format!("row type [{row_type}]")))
    }

    /// Mapper and column holding the named property of `model_type`.
    pub fn mapper_for_property(
        &self,
        model_type: &str,
        property: &str,
    ) -> IdentityResult<(&EntityMapper, &str)> {
        let mut bindings = self.property_bindings(model_type, property)?;
        Ok(bindings.remove(0))
    }

    /// Every mapper binding the named property of `model_type`, root first. Universal bases
    /// can see the same property on several subtype rows.
    pub fn property_bindings(
        &self,
        model_type: &str,
        property: &str,
    ) -> IdentityResult<Vec<(&EntityMapper, &str)>> {
        let property = ModelProperty::named(property);
        let mut bindings = Vec::new();
        for mapper in self.mappers_for(model_type)? {
            let column = mapper
                .descriptors
                .iter()
                .filter(|descriptor| self.covers(descriptor, model_type))
                .find_map(|descriptor| descriptor.column_for(&property));
            if let Some(column) = column {
                bindings.push((mapper, column));
            }
        }
        if bindings.is_empty() {
            return Err(IdentityError::no_mapper(format!(
                "type [{model_type}] has no mapped property [{property}]"
            )));
        }
        Ok(bindings)
    }

    pub fn attribute_mapper_for(&self, model_type: &str) -> IdentityResult<&EntityMapper> {
        let candidates = self.mappers_of_kind(RowKind::Attribute).collect::<Vec<_>>();
        self.most_specific_owner(model_type, candidates)
            .ok_or_else(|| {
                IdentityError::no_mapper(format!("no attribute rows for type [{model_type}]"))
            })
    }

    pub fn credential_mapper_for(
        &self,
        storage_type: &str,
        owner_type: &str,
    ) -> IdentityResult<&EntityMapper> {
        let mut best: Option<(usize, &EntityMapper)> = None;
        for mapper in self.mappers_of_kind(RowKind::Credential) {
            let Some(distance) = mapper
                .descriptors
                .iter()
                .filter_map(|descriptor| descriptor.support_distance(&self.hierarchy, storage_type))
                .min()
            else {
                continue;
            };
            if best.map_or(true, |(current, _)| distance < current) {
                best = Some((distance, mapper));
            }
        }
        let Some((distance, _)) = best else {
            return Err(IdentityError::no_mapper(format!(
                "no credential rows for storage [{storage_type}]"
            )));
        };
        let candidates = self
            .mappers_of_kind(RowKind::Credential)
            .filter(|mapper| {
                mapper
                    .descriptors
                    .iter()
                    .filter_map(|descriptor| {
                        descriptor.support_distance(&self.hierarchy, storage_type)
                    })
                    .min()
                    == Some(distance)
            })
            .collect::<Vec<_>>();
        self.most_specific_owner(owner_type, candidates)
            .ok_or_else(|| {
                IdentityError::no_mapper(format!(
                    "no credential rows for storage [{storage_type}] owned by [{owner_type}]"
                ))
            })
    }

    pub fn relationship_member_mapper(&self) -> IdentityResult<&EntityMapper> {
        self.mappers_of_kind(RowKind::RelationshipMember)
            .next()
            .ok_or_else(|| IdentityError::no_mapper("no relationship member rows configured"))
    }

    /// Lineage distance of a root descriptor; subtype-only roots rank last.
    fn root_rank(&self, mapper: &EntityMapper, model_type: &str) -> Option<usize> {
        if !mapper.is_root_for(&self.hierarchy, model_type) {
            return None;
        }
        let distance = mapper
            .descriptors
            .iter()
            .filter(|descriptor| descriptor.is_root)
            .filter_map(|descriptor| descriptor.support_distance(&self.hierarchy, model_type))
            .min();
        Some(distance.unwrap_or(usize::MAX))
    }

    fn covers(&self, descriptor: &MappingDescriptor, model_type: &str) -> bool {
        descriptor.supports(&self.hierarchy, model_type)
            || (BaseKind::is_queryable_base(model_type)
                && descriptor
                    .supported_types
                    .iter()
                    .any(|supported| self.hierarchy.is_assignable(model_type, supported)))
    }

    /// Owner on the target's root row, then on a managed supertype of it, then plain ids.
    fn most_specific_owner<'a>(
        &self,
        model_type: &str,
        candidates: Vec<&'a EntityMapper>,
    ) -> Option<&'a EntityMapper> {
        let root_rows = self.root_row_lineage(model_type);
        candidates
            .into_iter()
            .filter_map(|mapper| {
                let owner = mapper.owner()?;
                let rank = match &owner.target {
                    OwnerTarget::Row(row_type) => {
                        root_rows.iter().position(|candidate| candidate == row_type)?
                    }
                    OwnerTarget::Identifier => usize::MAX,
                };
                Some((rank, mapper))
            })
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, mapper)| mapper)
    }

    /// Row type of the root mapper followed by its managed supertypes.
    fn root_row_lineage(&self, model_type: &str) -> Vec<String> {
        let mut lineage = Vec::new();
        let Ok(root) = self.root_mapper_for(model_type) else {
            return lineage;
        };
        let mut current = Some(root.shape.row_type.clone());
        while let Some(row_type) = current {
            if lineage.contains(&row_type) {
                break;
            }
            current = self
                .mapper_for_row_type(&row_type)
                .ok()
                .and_then(|mapper| mapper.shape.extends.clone());
            lineage.push(row_type);
        }
        lineage
    }

    fn validate_roots(&self) -> IdentityResult<()> {
        let mut claimed: IndexMap<&str, &str> = IndexMap::new();
        for mapper in self.mappers_of_kind(RowKind::Managed) {
            for descriptor in mapper.descriptors.iter().filter(|d| d.is_root) {
                for supported in &descriptor.supported_types {
                    if let Some(previous) = claimed.insert(supported.as_str(), mapper.row_type()) {
                        return Err(IdentityError::integrity(format!(
                            "type [{supported}] has two root rows: [{previous}] and [{}]",
                            mapper.row_type()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn log_mappers(&self) {
        for (index, mapper) in self.mappers.iter().enumerate() {
            let types = mapper
                .descriptors
                .iter()
                .flat_map(|descriptor| descriptor.supported_types.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(", ");
            log::debug!(
                "identity mapper {index}: {} ({:?}) supports [{types}]",
                mapper.row_type(),
                mapper.kind
            );
        }
    }
}

struct Configurer<'a> {
    declared: &'a IndexMap<String, RowDeclaration>,
    visiting: HashSet<String>,
    configured: HashSet<String>,
    mappers: Vec<EntityMapper>,
}

impl Configurer<'_> {
    fn visit(&mut self, row_type: &str) -> IdentityResult<()> {
        if self.configured.contains(row_type) {
            return Ok(());
        }
        if !self.visiting.insert(row_type.to_string()) {
            return Err(IdentityError::integrity(format!(
                "row type [{row_type}] depends on itself"
            )));
        }
        let declaration = self
            .declared
            .get(row_type)
            .ok_or_else(|| IdentityError::no_mapper(format!("row type [{row_type}]")))?;
        for descriptor in &declaration.descriptors {
            if let Some(owner_row) = descriptor
                .owner
                .as_ref()
                .and_then(|owner| owner.owner_row_type())
                .filter(|owner_row| *owner_row != row_type)
            {
                self.visit(owner_row)?;
            }
        }
        if let Some(supertype) = &declaration.shape.extends {
            self.visit(supertype)?;
        }
        self.visiting.remove(row_type);
        self.configured.insert(row_type.to_string());
        self.mappers.push(declaration.clone().into());
        Ok(())
    }
}

fn validate_declaration(
    hierarchy: &TypeHierarchy,
    declared: &IndexMap<String, RowDeclaration>,
    declaration: &RowDeclaration,
) -> IdentityResult<()> {
    let shape = &declaration.shape;
    if let Some(supertype) = &shape.extends {
        if !declared.contains_key(supertype) {
            return Err(IdentityError::no_mapper(format!(
                "[{}] extends undeclared row type [{supertype}]",
                shape.row_type
            )));
        }
    }
    for descriptor in &declaration.descriptors {
        for supported in &descriptor.supported_types {
            if !hierarchy.contains(supported) {
                return Err(IdentityError::no_mapper(format!(
                    "[{}] maps unknown model type [{supported}]",
                    shape.row_type
                )));
            }
        }
        for (property, column) in &descriptor.bindings {
            require_column(shape, column, &format!("binding {property}"))?;
        }
        if let Some(column) = &descriptor.discriminator {
            require_column(shape, column, "discriminator")?;
        }
        match &descriptor.owner {
            Some(owner) => {
                require_column(shape, &owner.column, "owner")?;
                if let Some(owner_row) = owner.owner_row_type() {
                    if !declared.contains_key(owner_row) {
                        return Err(IdentityError::no_mapper(format!(
                            "[{}] is owned by undeclared row type [{owner_row}]",
                            shape.row_type
                        )));
                    }
                }
            }
            None if !descriptor.is_root || declaration.kind != RowKind::Managed => {
                return Err(IdentityError::integrity(format!(
                    "[{}] is not a root row and has no owner binding",
                    shape.row_type
                )));
            }
            None => {}
        }
        let required: &[ModelProperty] = match declaration.kind {
            RowKind::Managed => &[],
            RowKind::Attribute => {
                &[ModelProperty::AttributeName, ModelProperty::AttributeValue]
            }
            RowKind::RelationshipMember => {
                &[ModelProperty::MemberDescriptor, ModelProperty::MemberReference]
            }
            RowKind::Credential => &[ModelProperty::EffectiveDate],
        };
        for property in required {
            if descriptor.column_for(property).is_none() {
                return Err(IdentityError::integrity(format!(
                    "[{}] does not bind {property}",
                    shape.row_type
                )));
            }
        }
    }
    Ok(())
}

fn require_column(shape: &RowShape, column: &str, role: &str) -> IdentityResult<()> {
    if shape.has_column(column) {
        Ok(())
    } else {
        Err(IdentityError::integrity(format!(
            "{role} names column [{column}] missing from [{}]",
            shape.row_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::EntityMapperRegistry;
    use crate::mapping::{MappingDescriptor, OwnerBinding, RowDeclaration, RowKind};
    use aideon_identity_core::{
        ACCOUNT, ColumnKind, ENCODED_PASSWORD_STORAGE, IDENTITY_TYPE, IdentityError, REALM,
        ROLE, RowShape, TypeHierarchy, USER,
    };

    fn identity_root() -> RowDeclaration {
        RowDeclaration::new(
            RowShape::new("t_identity", "id")
                .column("type_name", ColumnKind::Text)
                .column("created", ColumnKind::Timestamp),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::root([IDENTITY_TYPE])
                .discriminator("type_name")
                .bind_named("createdDate", "created"),
        )
    }

    fn account_row() -> RowDeclaration {
        RowDeclaration::new(
            RowShape::new("t_account", "id").column("login", ColumnKind::Text),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::secondary([ACCOUNT], OwnerBinding::row("id", "t_identity"))
                .bind_named("loginName", "login"),
        )
    }

    fn attribute_row(row_type: &str, owner: OwnerBinding) -> RowDeclaration {
        RowDeclaration::new(
            RowShape::new(row_type, "id")
                .column("name", ColumnKind::Text)
                .column("value", ColumnKind::Text)
                .column("owner_id", ColumnKind::Text),
            RowKind::Attribute,
        )
        .describe(
            MappingDescriptor::secondary([aideon_identity_core::ATTRIBUTE], owner)
                .bind(aideon_identity_core::ModelProperty::AttributeName, "name")
                .bind(aideon_identity_core::ModelProperty::AttributeValue, "value"),
        )
    }

    #[test]
    fn owners_are_configured_before_dependents() {
        let registry = EntityMapperRegistry::configure(
            TypeHierarchy::builtin(),
            vec![
                attribute_row("t_attr", OwnerBinding::row("owner_id", "t_identity")),
                account_row(),
                identity_root(),
            ],
        )
        .expect("configure");
        let order = registry
            .mappers()
            .iter()
            .map(|mapper| mapper.row_type())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["t_identity", "t_attr", "t_account"]);
    }

    #[test]
    fn root_mapper_is_always_first() {
        let registry = EntityMapperRegistry::configure(
            TypeHierarchy::builtin(),
            vec![account_row(), identity_root()],
        )
        .expect("configure");
        for model_type in [IDENTITY_TYPE, ACCOUNT, USER, ROLE] {
            let mappers = registry.mappers_for(model_type).expect("mappers");
            assert_eq!(mappers[0].row_type(), "t_identity", "{model_type}");
        }
        assert_eq!(registry.mappers_for(USER).expect("user").len(), 2);
        assert_eq!(registry.mappers_for(ROLE).expect("role").len(), 1);
        assert_eq!(registry.mappers_for(IDENTITY_TYPE).expect("base").len(), 2);
    }

    #[test]
    fn unmapped_type_reports_no_mapper() {
        let registry =
            EntityMapperRegistry::configure(TypeHierarchy::builtin(), vec![identity_root()])
                .expect("configure");
        let err = registry.mappers_for(REALM).expect_err("no mapper");
        assert!(matches!(err, IdentityError::NoMapperFound { .. }));
        let err = registry
            .mapper_for_property(USER, "loginName")
            .expect_err("no property");
        assert!(matches!(err, IdentityError::NoMapperFound { .. }));
        let err = registry
            .credential_mapper_for(ENCODED_PASSWORD_STORAGE, USER)
            .expect_err("no credentials");
        assert!(matches!(err, IdentityError::NoMapperFound { .. }));
    }

    #[test]
    fn binding_to_missing_column_fails_fast() {
        let broken = RowDeclaration::new(RowShape::new("t_role", "id"), RowKind::Managed).describe(
            MappingDescriptor::secondary([ROLE], OwnerBinding::row("id", "t_identity"))
                .bind_named("name", "missing"),
        );
        let err = EntityMapperRegistry::configure(
            TypeHierarchy::builtin(),
            vec![identity_root(), broken],
        )
        .expect_err("missing column");
        assert!(matches!(err, IdentityError::ConfigurationIntegrity { .. }));
    }

    #[test]
    fn unknown_owner_or_type_fails() {
        let err = EntityMapperRegistry::configure(TypeHierarchy::builtin(), vec![account_row()])
            .expect_err("owner");
        assert!(matches!(err, IdentityError::NoMapperFound { .. }));

        let widget = RowDeclaration::new(RowShape::new("t_widget", "id"), RowKind::Managed)
            .describe(MappingDescriptor::root(["Widget"]));
        let err = EntityMapperRegistry::configure(TypeHierarchy::builtin(), vec![widget])
            .expect_err("type");
        assert!(matches!(err, IdentityError::NoMapperFound { .. }));
    }

    #[test]
    fn property_lookup_walks_joined_rows() {
        let registry = EntityMapperRegistry::configure(
            TypeHierarchy::builtin(),
            vec![identity_root(), account_row()],
        )
        .expect("configure");
        let (mapper, column) = registry
            .mapper_for_property(USER, "loginName")
            .expect("login");
        assert_eq!((mapper.row_type(), column), ("t_account", "login"));
        let (mapper, column) = registry
            .mapper_for_property(USER, "createdDate")
            .expect("created");
        assert_eq!((mapper.row_type(), column), ("t_identity", "created"));
    }

    #[test]
    fn base_types_report_every_subtype_binding() {
        let registry = crate::default_mapping::default_registry().expect("registry");
        let mut rows: Vec<_> = registry
            .property_bindings(IDENTITY_TYPE, "name")
            .expect("name")
            .into_iter()
            .map(|(mapper, column)| (mapper.row_type().to_string(), column.to_string()))
            .collect();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                ("idm_group".to_string(), "name".to_string()),
                ("idm_role".to_string(), "name".to_string()),
            ]
        );
        assert_eq!(registry.property_bindings(ROLE, "name").expect("role").len(), 1);
    }

    #[test]
    fn attribute_rows_prefer_exact_then_ancestor_then_identifier_owner() {
        let hierarchy = TypeHierarchy::builtin()
            .with_type("Device", IDENTITY_TYPE)
            .expect("device");
        let base = RowDeclaration::new(RowShape::new("t_base", "id"), RowKind::Managed);
        let device = RowDeclaration::new(
            RowShape::new("t_device", "id").extending("t_base"),
            RowKind::Managed,
        )
        .describe(MappingDescriptor::root(["Device"]));
        let declarations = vec![
            base,
            device,
            identity_root(),
            attribute_row("t_plain_attr", OwnerBinding::identifier("owner_id")),
            attribute_row("t_base_attr", OwnerBinding::row("owner_id", "t_base")),
            attribute_row("t_identity_attr", OwnerBinding::row("owner_id", "t_identity")),
        ];
        let registry =
            EntityMapperRegistry::configure(hierarchy.clone(), declarations.clone())
                .expect("configure");
        assert_eq!(
            registry.attribute_mapper_for(USER).expect("user").row_type(),
            "t_identity_attr"
        );
        assert_eq!(
            registry.attribute_mapper_for("Device").expect("device").row_type(),
            "t_base_attr"
        );
        assert_eq!(
            registry.attribute_mapper_for(REALM).expect("realm").row_type(),
            "t_plain_attr"
        );

        let without_plain = declarations
            .into_iter()
            .filter(|declaration| declaration.shape.row_type != "t_plain_attr")
            .collect();
        let registry =
            EntityMapperRegistry::configure(hierarchy, without_plain).expect("configure");
        let err = registry.attribute_mapper_for(REALM).expect_err("realm");
        assert!(matches!(err, IdentityError::NoMapperFound { .. }));
    }

    #[test]
    fn two_roots_for_one_type_are_rejected() {
        let other = RowDeclaration::new(RowShape::new("t_other", "id"), RowKind::Managed)
            .describe(MappingDescriptor::root([IDENTITY_TYPE]));
        let err = EntityMapperRegistry::configure(
            TypeHierarchy::builtin(),
            vec![identity_root(), other],
        )
        .expect_err("two roots");
        assert!(matches!(err, IdentityError::ConfigurationIntegrity { .. }));
    }
}
