use std::future::Future;
use std::pin::Pin;

use sea_orm::sea_query::{Expr, ExprTrait};

use aideon_identity_core::{
    AttributedType, ColumnKind, Id, IdentityError, IdentityResult, ModelProperty,
    PropertyAccess, PropertyValue, RelationalSession, Row, Value,
};

use super::descriptor::{EntityMapper, MappingDescriptor, RowKind};
use super::registry::EntityMapperRegistry;
use crate::session::{ident, select_all, to_sea_value};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Moves attributed types in and out of their managed rows.
#[derive(Clone, Copy)]
pub struct ObjectRowTranslator<'r> {
    registry: &'r EntityMapperRegistry,
}

impl<'r> ObjectRowTranslator<'r> {
    pub fn new(registry: &'r EntityMapperRegistry) -> Self {
        Self { registry }
    }

    pub async fn persist(
        &self,
        session: &dyn RelationalSession,
        instance: &AttributedType,
    ) -> IdentityResult<()> {
        self.persist_with(session, instance, &[]).await
    }

    /// Persists the root row and every joined row. `side_values` feed bindings that have
    /// no counterpart on the instance, such as a partition's configuration name.
    pub async fn persist_with(
        &self,
        session: &dyn RelationalSession,
        instance: &AttributedType,
        side_values: &[(ModelProperty, Value)],
    ) -> IdentityResult<()> {
        for (mapper, descriptor) in self.managed(&instance.model_type)? {
            if !descriptor.is_persist {
                continue;
            }
            let row = self
                .build_row(session, mapper, descriptor, instance, side_values)
                .await?;
            session.insert(&mapper.shape, &row).await?;
        }
        Ok(())
    }

    /// Re-applies bound properties onto existing rows. The identifier never changes.
    pub async fn update(
        &self,
        session: &dyn RelationalSession,
        instance: &AttributedType,
    ) -> IdentityResult<()> {
        let root = self.registry.root_mapper_for(&instance.model_type)?;
        if session
            .find(&root.shape, &Value::from(instance.id))
            .await?
            .is_none()
        {
            return Err(IdentityError::not_found(format!(
                "{} [{}] has not been persisted",
                instance.model_type, instance.id
            )));
        }
        for (mapper, descriptor) in self.managed(&instance.model_type)? {
            if !descriptor.is_persist {
                continue;
            }
            let row = self
                .build_row(session, mapper, descriptor, instance, &[])
                .await?;
            session.merge(&mapper.shape, &row).await?;
        }
        Ok(())
    }

    /// Deletes joined rows, deepest first. Attribute, member and credential rows are the
    /// caller's job.
    pub async fn remove_secondary(
        &self,
        session: &dyn RelationalSession,
        instance: &AttributedType,
    ) -> IdentityResult<()> {
        let mappers = self.managed(&instance.model_type)?;
        for (mapper, _) in mappers.iter().skip(1).rev() {
            let id = Value::from(instance.id);
            if let Some(row) = session.find(&mapper.shape, &id).await? {
                session.remove(&mapper.shape, &row).await?;
            }
        }
        Ok(())
    }

    /// Deletes the root row only.
    pub async fn remove(
        &self,
        session: &dyn RelationalSession,
        instance: &AttributedType,
    ) -> IdentityResult<()> {
        let root = self.registry.root_mapper_for(&instance.model_type)?;
        let Some(row) = session.find(&root.shape, &Value::from(instance.id)).await? else {
            return Err(IdentityError::not_found(format!(
                "{} [{}] has not been persisted",
                instance.model_type, instance.id
            )));
        };
        session.remove(&root.shape, &row).await
    }

    /// Rebuilds the instance a root row belongs to, following reference columns by lookup.
    pub fn hydrate<'a>(
        &'a self,
        session: &'a dyn RelationalSession,
        row: Row,
    ) -> BoxFuture<'a, IdentityResult<AttributedType>> {
        self.hydrate_within(session, row, Vec::new())
    }

    /// `path` holds the instances being hydrated above this row. A reference back into it
    /// comes out as an identifier-only instance.
    fn hydrate_within<'a>(
        &'a self,
        session: &'a dyn RelationalSession,
        row: Row,
        mut path: Vec<Id>,
    ) -> BoxFuture<'a, IdentityResult<AttributedType>> {
        Box::pin(async move {
            let mapper = self.registry.mapper_for_row_type(&row.row_type)?;
            let model_type = self.resolve_type(mapper, &row)?;
            let id = row_id(mapper, &row)?;
            let mut instance = AttributedType::with_id(model_type.clone(), id);
            if path.contains(&id) {
                return Ok(instance);
            }
            path.push(id);
            for (joined, descriptor) in self.managed(&model_type)? {
                let source = if joined.row_type() == row.row_type {
                    row.clone()
                } else {
                    match session.find(&joined.shape, &Value::from(id)).await? {
                        Some(source) => source,
                        None => continue,
                    }
                };
                for (property, column) in &descriptor.bindings {
                    if !matches!(property, ModelProperty::Named(_)) {
                        continue;
                    }
                    let raw = source.get(column);
                    if raw.is_null() {
                        continue;
                    }
                    let kind = joined
                        .shape
                        .find_column(column)
                        .map(|column| &column.kind)
                        .ok_or_else(|| missing_column(joined, column))?;
                    let value = match kind {
                        ColumnKind::Reference(row_type) => {
                            match self
                                .resolve_reference(session, row_type, raw, &path)
                                .await?
                            {
                                Some(target) => PropertyValue::from(target),
                                None => continue,
                            }
                        }
                        _ => PropertyValue::Value(raw.clone()),
                    };
                    instance.write(property, value)?;
                }
            }
            Ok(instance)
        })
    }

    /// Rows of `mapper` owned by `owner`.
    pub async fn associated_rows(
        &self,
        session: &dyn RelationalSession,
        owner: &AttributedType,
        mapper: &EntityMapper,
    ) -> IdentityResult<Vec<Row>> {
        let owner_binding = mapper.owner().ok_or_else(|| {
            IdentityError::integrity(format!("[{}] has no owner binding", mapper.row_type()))
        })?;
        let owner_kind = mapper
            .shape
            .find_column(&owner_binding.column)
            .map(|column| column.kind.clone())
            .ok_or_else(|| missing_column(mapper, &owner_binding.column))?;
        let mut select = select_all(&mapper.shape);
        select.and_where(
            Expr::col(ident(&owner_binding.column)).eq(to_sea_value(
                &owner_kind,
                &owner_binding.column,
                &Value::from(owner.id),
            )?),
        );
        session.execute(&mapper.shape, &select).await
    }

    /// Identifier of the persisted row behind `instance`, or `None` when it was never stored.
    pub async fn row_reference(
        &self,
        session: &dyn RelationalSession,
        instance: &AttributedType,
    ) -> IdentityResult<Option<Value>> {
        let root = self.registry.root_mapper_for(&instance.model_type)?;
        let row = session.find(&root.shape, &Value::from(instance.id)).await?;
        Ok(row.map(|row| row.identifier(&root.shape).clone()))
    }

    fn managed(
        &self,
        model_type: &str,
    ) -> IdentityResult<Vec<(&'r EntityMapper, &'r MappingDescriptor)>> {
        let hierarchy = self.registry.hierarchy();
        Ok(self
            .registry
            .mappers_for(model_type)?
            .into_iter()
            .filter(|mapper| mapper.kind == RowKind::Managed)
            .filter_map(|mapper| {
                mapper
                    .descriptor_for(hierarchy, model_type)
                    .map(|descriptor| (mapper, descriptor))
            })
            .collect())
    }

    async fn build_row(
        &self,
        session: &dyn RelationalSession,
        mapper: &EntityMapper,
        descriptor: &MappingDescriptor,
        instance: &AttributedType,
        side_values: &[(ModelProperty, Value)],
    ) -> IdentityResult<Row> {
        let shape = &mapper.shape;
        let mut row = Row::new(shape.row_type.clone()).with(shape.identifier.clone(), instance.id);
        for (property, column) in &descriptor.bindings {
            let kind = shape
                .find_column(column)
                .map(|column| &column.kind)
                .ok_or_else(|| missing_column(mapper, column))?;
            let value = match property {
                ModelProperty::Identifier => Value::from(instance.id),
                ModelProperty::Named(_) => match instance.read(property) {
                    None => Value::Null,
                    Some(PropertyValue::Value(value)) => value,
                    Some(PropertyValue::Type(target)) => {
                        self.reference_value(session, kind, property, &target).await?
                    }
                },
                _ => match side_values.iter().find(|(side, _)| side == property) {
                    Some((_, value)) => value.clone(),
                    None => continue,
                },
            };
            row.set(column.clone(), value);
        }
        if let Some(column) = &descriptor.discriminator {
            row.set(column.clone(), instance.model_type.clone());
        }
        if let Some(owner) = &descriptor.owner {
            if owner.column != shape.identifier {
                let owner_id = match &owner.property {
                    Some(property) => match instance.read(property) {
                        Some(PropertyValue::Type(target)) => Value::from(target.id),
                        Some(PropertyValue::Value(value)) => value,
                        None => Value::Null,
                    },
                    None => Value::from(instance.id),
                };
                row.set(owner.column.clone(), owner_id);
            }
        }
        Ok(row)
    }

    async fn reference_value(
        &self,
        session: &dyn RelationalSession,
        kind: &ColumnKind,
        property: &ModelProperty,
        target: &AttributedType,
    ) -> IdentityResult<Value> {
        if !matches!(kind, ColumnKind::Reference(_)) {
            return Err(IdentityError::integrity(format!(
                "property {property} holds a {} but its column is not a reference",
                target.model_type
            )));
        }
        self.row_reference(session, target).await?.ok_or_else(|| {
            IdentityError::not_found(format!(
                "{} [{}] referenced by {property} has not been persisted",
                target.model_type, target.id
            ))
        })
    }

    async fn resolve_reference(
        &self,
        session: &dyn RelationalSession,
        row_type: &str,
        raw: &Value,
        path: &[Id],
    ) -> IdentityResult<Option<AttributedType>> {
        let mapper = self.registry.mapper_for_row_type(row_type)?;
        match session.find(&mapper.shape, raw).await? {
            Some(target) => Ok(Some(
                self.hydrate_within(session, target, path.to_vec()).await?,
            )),
            None => Ok(None),
        }
    }

    fn resolve_type(&self, mapper: &EntityMapper, row: &Row) -> IdentityResult<String> {
        let hierarchy = self.registry.hierarchy();
        if let Some(column) = mapper.discriminator() {
            let tag = row.get(column).as_str().ok_or_else(|| {
                IdentityError::integrity(format!(
                    "[{}] row has no type in [{column}]",
                    mapper.row_type()
                ))
            })?;
            if !hierarchy.contains(tag) || mapper.descriptor_for(hierarchy, tag).is_none() {
                return Err(IdentityError::integrity(format!(
                    "[{}] row names unsupported type [{tag}]",
                    mapper.row_type()
                )));
            }
            return Ok(tag.to_string());
        }
        let mut supported = mapper
            .descriptors
            .iter()
            .filter(|descriptor| descriptor.is_root)
            .flat_map(|descriptor| descriptor.supported_types.iter());
        match (supported.next(), supported.next()) {
            (Some(model_type), None) => Ok(model_type.clone()),
            _ => Err(IdentityError::integrity(format!(
                "[{}] needs a discriminator to tell its types apart",
                mapper.row_type()
            ))),
        }
    }
}

fn row_id(mapper: &EntityMapper, row: &Row) -> IdentityResult<Id> {
    let text = row.identifier(&mapper.shape).as_str().ok_or_else(|| {
        IdentityError::integrity(format!("[{}] row has no identifier", mapper.row_type()))
    })?;
    Id::parse(text)
}

fn missing_column(mapper: &EntityMapper, column: &str) -> IdentityError {
    IdentityError::integrity(format!(
        "column [{column}] missing from [{}]",
        mapper.row_type()
    ))
}
