use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use sea_orm::sea_query::{Expr, ExprTrait, Order};

use aideon_identity_core::{
    ACCOUNT, Attribute, AttributeStoreApi, AttributedType, BaseKind, ColumnKind,
    CredentialStorage, CredentialStoreApi, Id, IdentityContext, IdentityError, IdentityResult,
    IdentityStoreApi, ModelProperty, PROP_NAME, PROP_PARTITION, PartitionStoreApi,
    PropertyAccess, PropertyValue, Query, RelationalSession, RelationshipReference, Row,
    Timestamp, Value, codec,
};

use crate::default_mapping::default_registry;
use crate::mapping::{EntityMapper, EntityMapperRegistry, ObjectRowTranslator, RowKind};
use crate::query::{QueryTranslator, Translation};
use crate::session::{ident, select_all, to_sea_value};

/// Identity, partition, attribute and credential operations over a configured mapping.
#[derive(Clone)]
pub struct IdentityStore {
    registry: Arc<EntityMapperRegistry>,
}

impl IdentityStore {
    pub fn new(registry: EntityMapperRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn with_default_mapping() -> IdentityResult<Self> {
        Ok(Self::new(default_registry()?))
    }

    pub fn registry(&self) -> &EntityMapperRegistry {
        &self.registry
    }

    fn translator(&self) -> ObjectRowTranslator<'_> {
        ObjectRowTranslator::new(&self.registry)
    }

    fn base_kind(&self, model_type: &str) -> IdentityResult<BaseKind> {
        self.registry
            .hierarchy()
            .base_kind(model_type)
            .ok_or_else(|| IdentityError::no_mapper(format!("unknown model type [{model_type}]")))
    }

    fn require_kind(&self, model_type: &str, expected: BaseKind) -> IdentityResult<()> {
        let kind = self.base_kind(model_type)?;
        if kind != expected {
            return Err(IdentityError::invalid(format!(
                "[{model_type}] is not a {}",
                expected.type_name()
            )));
        }
        Ok(())
    }

    /// Hydrated instance of `model_type` (or a subtype) stored under `id`, without members.
    async fn find_instance(
        &self,
        session: &dyn RelationalSession,
        model_type: &str,
        id: Id,
    ) -> IdentityResult<Option<AttributedType>> {
        let hierarchy = self.registry.hierarchy();
        for root in self.registry.root_mappers_for(model_type)? {
            let Some(row) = session.find(&root.shape, &Value::from(id)).await? else {
                continue;
            };
            let instance = self.translator().hydrate(session, row).await?;
            if hierarchy.is_assignable(model_type, &instance.model_type) {
                return Ok(Some(instance));
            }
        }
        Ok(None)
    }

    async fn run_query(
        &self,
        session: &dyn RelationalSession,
        query: &Query,
        default_partition: Option<&AttributedType>,
    ) -> IdentityResult<Vec<AttributedType>> {
        let translation = QueryTranslator::new(&self.registry)
            .translate(session, query, default_partition)
            .await?;
        let mut results = Vec::new();
        match translation {
            Translation::Empty => {}
            Translation::Lookup(ids) => {
                for id in ids {
                    if let Some(found) = self
                        .find_instance(session, &query.target_type, id)
                        .await?
                    {
                        results.push(found);
                    }
                }
            }
            Translation::Select(plan) => {
                let root = self.registry.mapper_for_row_type(&plan.root_row_type)?;
                let mut seen = IndexSet::new();
                for row in session.execute(&plan.projection, &plan.statement).await? {
                    let id = row_id(&row, &plan.projection.identifier)?;
                    if !seen.insert(id) {
                        continue;
                    }
                    if let Some(root_row) = session.find(&root.shape, &Value::from(id)).await? {
                        results.push(self.translator().hydrate(session, root_row).await?);
                    }
                }
            }
        }
        Ok(results)
    }

    /// Default partition filter for identity queries.
    fn query_partition<'c>(
        &self,
        context: &'c IdentityContext<'_>,
        target_type: &str,
    ) -> IdentityResult<Option<&'c AttributedType>> {
        Ok(match self.base_kind(target_type)? {
            BaseKind::IdentityType => context.partition(),
            _ => None,
        })
    }

    async fn add_members(
        &self,
        session: &dyn RelationalSession,
        relationship: &AttributedType,
    ) -> IdentityResult<()> {
        let mapper = self.registry.relationship_member_mapper()?;
        let columns = MemberColumns::of(mapper)?;
        let translator = QueryTranslator::new(&self.registry);
        for (descriptor, value) in &relationship.properties {
            let PropertyValue::Type(identity) = value else {
                continue;
            };
            let token = translator.member_token(session, identity).await?.ok_or_else(|| {
                IdentityError::not_found(format!(
                    "{} [{}] in [{descriptor}] has not been persisted",
                    identity.model_type, identity.id
                ))
            })?;
            columns
                .insert(session, mapper, relationship.id, descriptor, token)
                .await?;
        }
        if let Some(reference) = &relationship.reference {
            if columns.reference_kind == ColumnKind::Text {
                for (descriptor, token) in &reference.identity_references {
                    if relationship.property(descriptor).is_some() {
                        continue;
                    }
                    columns
                        .insert(session, mapper, relationship.id, descriptor, token.clone())
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn remove_members(
        &self,
        session: &dyn RelationalSession,
        relationship: &AttributedType,
    ) -> IdentityResult<()> {
        let mapper = self.registry.relationship_member_mapper()?;
        for row in self
            .translator()
            .associated_rows(session, relationship, mapper)
            .await?
        {
            session.remove(&mapper.shape, &row).await?;
        }
        Ok(())
    }

    /// Fills member properties from member rows. Text members are also reported through
    /// [`AttributedType::reference`].
    async fn load_members(
        &self,
        session: &dyn RelationalSession,
        relationship: &mut AttributedType,
    ) -> IdentityResult<()> {
        let mapper = self.registry.relationship_member_mapper()?;
        let columns = MemberColumns::of(mapper)?;
        let rows = self
            .translator()
            .associated_rows(session, relationship, mapper)
            .await?;
        let mut reference = RelationshipReference::default();
        for row in rows {
            let Some(descriptor) = row.get(&columns.descriptor).as_str() else {
                continue;
            };
            let raw = row.get(&columns.reference);
            match &columns.reference_kind {
                ColumnKind::Reference(row_type) => {
                    let target = self.registry.mapper_for_row_type(row_type)?;
                    if let Some(target_row) = session.find(&target.shape, raw).await? {
                        let identity = self.translator().hydrate(session, target_row).await?;
                        relationship.set(descriptor, identity);
                    }
                }
                _ => {
                    let Some(token) = raw.as_str() else {
                        continue;
                    };
                    reference.add_identity_reference(descriptor, token);
                    let Ok(parsed) = RelationshipReference::parse_id(token) else {
                        log::warn!(
                            "relationship [{}] holds malformed member '{token}'",
                            relationship.id
                        );
                        continue;
                    };
                    if !self.registry.hierarchy().contains(&parsed.model_type) {
                        continue;
                    }
                    if let Some(identity) = self
                        .find_instance(session, &parsed.model_type, parsed.id)
                        .await?
                    {
                        relationship.set(descriptor, identity);
                    }
                }
            }
        }
        if !reference.identity_references.is_empty() {
            relationship.reference = Some(reference);
        }
        Ok(())
    }

    /// Relationships holding `identity` in any member slot.
    async fn relationships_of(
        &self,
        session: &dyn RelationalSession,
        identity: &AttributedType,
    ) -> IdentityResult<Vec<AttributedType>> {
        let Some(token) = QueryTranslator::new(&self.registry)
            .member_token(session, identity)
            .await?
        else {
            return Ok(Vec::new());
        };
        let mapper = self.registry.relationship_member_mapper()?;
        let columns = MemberColumns::of(mapper)?;
        let mut select = select_all(&mapper.shape);
        select.and_where(Expr::col(ident(&columns.reference)).eq(to_sea_value(
            &columns.reference_kind,
            &columns.reference,
            &token,
        )?));
        let mut owners = IndexSet::new();
        for row in session.execute(&mapper.shape, &select).await? {
            owners.insert(row_id(&row, &columns.owner)?);
        }
        let relationship_type = BaseKind::Relationship.type_name();
        let mut relationships = Vec::with_capacity(owners.len());
        for owner in owners {
            if let Some(found) = self.find_instance(session, relationship_type, owner).await? {
                relationships.push(found);
            }
        }
        Ok(relationships)
    }

    async fn remove_relationship(
        &self,
        session: &dyn RelationalSession,
        relationship: &AttributedType,
    ) -> IdentityResult<()> {
        let translator = self.translator();
        self.remove_attribute_rows(session, relationship).await?;
        self.remove_members(session, relationship).await?;
        translator.remove_secondary(session, relationship).await?;
        translator.remove(session, relationship).await
    }

    async fn remove_attribute_rows(
        &self,
        session: &dyn RelationalSession,
        owner: &AttributedType,
    ) -> IdentityResult<()> {
        let mapper = self.registry.attribute_mapper_for(&owner.model_type)?;
        for row in self.translator().associated_rows(session, owner, mapper).await? {
            session.remove(&mapper.shape, &row).await?;
        }
        Ok(())
    }

    /// Attribute rows of `owner`, optionally restricted to one name.
    async fn attribute_rows(
        &self,
        session: &dyn RelationalSession,
        owner: &AttributedType,
        name: Option<&str>,
    ) -> IdentityResult<(&EntityMapper, String, String, Vec<Row>)> {
        let mapper = self.registry.attribute_mapper_for(&owner.model_type)?;
        let name_column = bound(mapper, &ModelProperty::AttributeName)?.to_string();
        let value_column = bound(mapper, &ModelProperty::AttributeValue)?.to_string();
        let rows = self
            .translator()
            .associated_rows(session, owner, mapper)
            .await?
            .into_iter()
            .filter(|row| name.map_or(true, |name| row.get(&name_column).as_str() == Some(name)))
            .collect();
        Ok((mapper, name_column, value_column, rows))
    }

    async fn credential_rows(
        &self,
        session: &dyn RelationalSession,
        account: &AttributedType,
        storage_type: &str,
        limit: Option<u64>,
    ) -> IdentityResult<Vec<CredentialStorage>> {
        let mapper = self
            .registry
            .credential_mapper_for(storage_type, &account.model_type)?;
        let descriptor = mapper
            .descriptor_for(self.registry.hierarchy(), storage_type)
            .ok_or_else(|| {
                IdentityError::no_mapper(format!("no credential rows for storage [{storage_type}]"))
            })?;
        let owner = owner_column(mapper)?;
        let effective = bound(mapper, &ModelProperty::EffectiveDate)?;

        let mut select = select_all(&mapper.shape);
        select
            .and_where(Expr::col(ident(owner)).eq(column_value(
                mapper,
                owner,
                &Value::from(account.id),
            )?))
            .and_where(Expr::col(ident(effective)).lte(Timestamp::now().as_millis()))
            .order_by(ident(effective), Order::Desc);
        if let Some(column) = &descriptor.discriminator {
            select.and_where(Expr::col(ident(column)).eq(storage_type.to_string()));
        }
        if let Some(limit) = limit {
            select.limit(limit);
        }

        let mut credentials = Vec::new();
        for row in session.execute(&mapper.shape, &select).await? {
            let stored_type = descriptor
                .discriminator
                .as_ref()
                .and_then(|column| row.get(column).as_str())
                .unwrap_or(storage_type);
            let mut storage = CredentialStorage::new(stored_type);
            for (property, column) in &descriptor.bindings {
                storage.write(property, PropertyValue::Value(row.get(column).clone()))?;
            }
            credentials.push(storage);
        }
        Ok(credentials)
    }
}

#[async_trait]
impl IdentityStoreApi for IdentityStore {
    async fn add(
        &self,
        context: &IdentityContext<'_>,
        value: &AttributedType,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        let translator = self.translator();
        match self.base_kind(&value.model_type)? {
            BaseKind::IdentityType => {
                translator
                    .persist(session, &scoped_to_context(context, value))
                    .await?
            }
            BaseKind::Relationship => {
                translator.persist(session, value).await?;
                self.add_members(session, value).await?;
            }
            BaseKind::Partition => translator.persist(session, value).await?,
            other => {
                return Err(IdentityError::invalid(format!(
                    "cannot add a {} as [{}]",
                    other.type_name(),
                    value.model_type
                )));
            }
        }
        log::debug!("added {} [{}]", value.model_type, value.id);
        Ok(())
    }

    async fn update(
        &self,
        context: &IdentityContext<'_>,
        value: &AttributedType,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        match self.base_kind(&value.model_type)? {
            BaseKind::IdentityType => {
                self.translator()
                    .update(session, &scoped_to_context(context, value))
                    .await?
            }
            BaseKind::Relationship => {
                self.translator().update(session, value).await?;
                self.remove_members(session, value).await?;
                self.add_members(session, value).await?;
            }
            _ => self.translator().update(session, value).await?,
        }
        Ok(())
    }

    async fn remove(
        &self,
        context: &IdentityContext<'_>,
        value: &AttributedType,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        let translator = self.translator();
        match self.base_kind(&value.model_type)? {
            BaseKind::Relationship => self.remove_relationship(session, value).await?,
            BaseKind::IdentityType => {
                for relationship in self.relationships_of(session, value).await? {
                    log::debug!(
                        "removing {} [{}] with member [{}]",
                        relationship.model_type,
                        relationship.id,
                        value.id
                    );
                    self.remove_relationship(session, &relationship).await?;
                }
                if self
                    .registry
                    .hierarchy()
                    .is_assignable(ACCOUNT, &value.model_type)
                {
                    self.remove_credentials(context, value).await?;
                }
                self.remove_attribute_rows(session, value).await?;
                translator.remove_secondary(session, value).await?;
                translator.remove(session, value).await?;
            }
            BaseKind::Partition => self.remove_partition(context, value).await?,
            other => {
                return Err(IdentityError::invalid(format!(
                    "cannot remove a {} as [{}]",
                    other.type_name(),
                    value.model_type
                )));
            }
        }
        log::debug!("removed {} [{}]", value.model_type, value.id);
        Ok(())
    }

    async fn lookup_identity_by_id(
        &self,
        context: &IdentityContext<'_>,
        model_type: &str,
        id: Id,
    ) -> IdentityResult<Option<AttributedType>> {
        let session = context.session()?;
        let Some(mut found) = self.find_instance(session, model_type, id).await? else {
            return Ok(None);
        };
        if self.base_kind(&found.model_type)? == BaseKind::Relationship {
            self.load_members(session, &mut found).await?;
        }
        Ok(Some(found))
    }

    async fn fetch_identities(
        &self,
        context: &IdentityContext<'_>,
        query: &Query,
    ) -> IdentityResult<Vec<AttributedType>> {
        let session = context.session()?;
        if self.base_kind(&query.target_type)? == BaseKind::Relationship {
            return self.fetch_relationships(context, query).await;
        }
        let partition = self.query_partition(context, &query.target_type)?;
        self.run_query(session, query, partition).await
    }

    async fn count_identities(
        &self,
        context: &IdentityContext<'_>,
        query: &Query,
    ) -> IdentityResult<usize> {
        let session = context.session()?;
        let partition = self.query_partition(context, &query.target_type)?;
        let translation = QueryTranslator::new(&self.registry)
            .translate(session, query, partition)
            .await?;
        match translation {
            Translation::Empty => Ok(0),
            Translation::Lookup(ids) => {
                let mut count = 0;
                for id in ids.into_iter().collect::<IndexSet<_>>() {
                    if self
                        .find_instance(session, &query.target_type, id)
                        .await?
                        .is_some()
                    {
                        count += 1;
                    }
                }
                Ok(count)
            }
            Translation::Select(plan) => {
                let mut ids = IndexSet::new();
                for row in session.execute(&plan.projection, &plan.statement).await? {
                    ids.insert(row_id(&row, &plan.projection.identifier)?);
                }
                Ok(ids.len())
            }
        }
    }

    async fn fetch_relationships(
        &self,
        context: &IdentityContext<'_>,
        query: &Query,
    ) -> IdentityResult<Vec<AttributedType>> {
        let session = context.session()?;
        self.require_kind(&query.target_type, BaseKind::Relationship)?;
        let mut relationships = self.run_query(session, query, None).await?;
        for relationship in &mut relationships {
            self.load_members(session, relationship).await?;
        }
        Ok(relationships)
    }
}

#[async_trait]
impl PartitionStoreApi for IdentityStore {
    async fn add_partition(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
        configuration_name: &str,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        self.require_kind(&partition.model_type, BaseKind::Partition)?;
        self.translator()
            .persist_with(
                session,
                partition,
                &[(
                    ModelProperty::ConfigurationName,
                    Value::from(configuration_name),
                )],
            )
            .await?;
        log::debug!(
            "added {} [{}] with configuration [{configuration_name}]",
            partition.model_type,
            partition.id
        );
        Ok(())
    }

    async fn update_partition(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        self.require_kind(&partition.model_type, BaseKind::Partition)?;
        self.translator().update(session, partition).await
    }

    async fn remove_partition(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        self.require_kind(&partition.model_type, BaseKind::Partition)?;
        let translator = self.translator();
        self.remove_attribute_rows(session, partition).await?;
        translator.remove_secondary(session, partition).await?;
        translator.remove(session, partition).await
    }

    async fn configuration_name(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
    ) -> IdentityResult<String> {
        let session = context.session()?;
        let root = self.registry.root_mapper_for(&partition.model_type)?;
        let column = root
            .bound_column(&ModelProperty::ConfigurationName)
            .ok_or_else(|| {
                IdentityError::integrity(format!(
                    "[{}] does not store a configuration name",
                    root.row_type()
                ))
            })?;
        let row = session
            .find(&root.shape, &Value::from(partition.id))
            .await?
            .ok_or_else(|| {
                IdentityError::not_found(format!(
                    "{} [{}] has not been persisted",
                    partition.model_type, partition.id
                ))
            })?;
        match row.get(column).as_str() {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => Err(IdentityError::integrity(format!(
                "{} [{}] has no configuration name",
                partition.model_type, partition.id
            ))),
        }
    }

    async fn lookup_partition(
        &self,
        context: &IdentityContext<'_>,
        partition_type: &str,
        name: &str,
    ) -> IdentityResult<Option<AttributedType>> {
        let session = context.session()?;
        self.require_kind(partition_type, BaseKind::Partition)?;
        let query = Query::new(partition_type).equals(PROP_NAME, name);
        let mut found = self.run_query(session, &query, None).await?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            count => Err(IdentityError::ambiguous(format!(
                "{count} partitions of type [{partition_type}] are named [{name}]"
            ))),
        }
    }

    async fn list_partitions(
        &self,
        context: &IdentityContext<'_>,
        partition_type: &str,
    ) -> IdentityResult<Vec<AttributedType>> {
        let session = context.session()?;
        self.require_kind(partition_type, BaseKind::Partition)?;
        self.run_query(session, &Query::new(partition_type), None).await
    }

    async fn lookup_partition_by_id(
        &self,
        context: &IdentityContext<'_>,
        partition_type: &str,
        id: Id,
    ) -> IdentityResult<Option<AttributedType>> {
        let session = context.session()?;
        self.require_kind(partition_type, BaseKind::Partition)?;
        self.find_instance(session, partition_type, id).await
    }
}

#[async_trait]
impl AttributeStoreApi for IdentityStore {
    async fn get_attribute(
        &self,
        context: &IdentityContext<'_>,
        owner: &AttributedType,
        name: &str,
    ) -> IdentityResult<Option<Attribute>> {
        let session = context.session()?;
        let (_, _, value_column, rows) = self.attribute_rows(session, owner, Some(name)).await?;
        let mut value: Option<Value> = None;
        for row in rows {
            let Some(text) = row.get(&value_column).as_str() else {
                continue;
            };
            let decoded = codec::decode(text)?;
            value = Some(match value {
                Some(existing) => codec::merge_values(existing, decoded),
                None => decoded,
            });
        }
        Ok(value.map(|value| Attribute::new(name, value)))
    }

    async fn set_attribute(
        &self,
        context: &IdentityContext<'_>,
        owner: &AttributedType,
        attribute: &Attribute,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        self.remove_attribute(context, owner, &attribute.name).await?;

        let mapper = self.registry.attribute_mapper_for(&owner.model_type)?;
        let name_column = bound(mapper, &ModelProperty::AttributeName)?;
        let value_column = bound(mapper, &ModelProperty::AttributeValue)?;
        let owner_column = owner_column(mapper)?;
        let owner_value = match mapper.shape.find_column(owner_column).map(|c| &c.kind) {
            Some(ColumnKind::Reference(_)) => self
                .translator()
                .row_reference(session, owner)
                .await?
                .ok_or_else(|| {
                    IdentityError::not_found(format!(
                        "{} [{}] has not been persisted",
                        owner.model_type, owner.id
                    ))
                })?,
            _ => Value::from(owner.id),
        };
        for scalar in codec::storage_values(&attribute.value) {
            let row = Row::new(mapper.row_type())
                .with(mapper.shape.identifier.clone(), Id::new())
                .with(name_column, attribute.name.clone())
                .with(value_column, codec::encode(scalar)?)
                .with(owner_column, owner_value.clone());
            session.insert(&mapper.shape, &row).await?;
        }
        Ok(())
    }

    async fn remove_attribute(
        &self,
        context: &IdentityContext<'_>,
        owner: &AttributedType,
        name: &str,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        let (mapper, _, _, rows) = self.attribute_rows(session, owner, Some(name)).await?;
        for row in rows {
            session.remove(&mapper.shape, &row).await?;
        }
        Ok(())
    }

    async fn load_attributes(
        &self,
        context: &IdentityContext<'_>,
        owner: &mut AttributedType,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        let (_, name_column, value_column, rows) =
            self.attribute_rows(session, owner, None).await?;
        let mut values: IndexMap<String, Value> = IndexMap::new();
        for row in rows {
            let (Some(name), Some(text)) =
                (row.get(&name_column).as_str(), row.get(&value_column).as_str())
            else {
                continue;
            };
            let decoded = codec::decode(text)?;
            let merged = match values.shift_remove(name) {
                Some(existing) => codec::merge_values(existing, decoded),
                None => decoded,
            };
            values.insert(name.to_string(), merged);
        }
        owner.attributes.clear();
        for (name, value) in values {
            owner.set_attribute(Attribute::new(name, value));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStoreApi for IdentityStore {
    async fn store_credential(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
        storage: &CredentialStorage,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        let mapper = self
            .registry
            .credential_mapper_for(&storage.storage_type, &account.model_type)?;
        let descriptor = mapper
            .descriptor_for(self.registry.hierarchy(), &storage.storage_type)
            .ok_or_else(|| {
                IdentityError::no_mapper(format!(
                    "no credential rows for storage [{}]",
                    storage.storage_type
                ))
            })?;
        let owner = self
            .translator()
            .row_reference(session, account)
            .await?
            .ok_or_else(|| {
                IdentityError::not_found(format!(
                    "{} [{}] has not been persisted",
                    account.model_type, account.id
                ))
            })?;

        let mut row = Row::new(mapper.row_type()).with(mapper.shape.identifier.clone(), Id::new());
        for (property, column) in &descriptor.bindings {
            if let Some(PropertyValue::Value(value)) = storage.read(property) {
                row.set(column.clone(), value);
            }
        }
        if let Some(column) = &descriptor.discriminator {
            row.set(column.clone(), storage.storage_type.clone());
        }
        row.set(owner_column(mapper)?, owner);
        session.insert(&mapper.shape, &row).await?;
        log::debug!(
            "stored {} for {} [{}]",
            storage.storage_type,
            account.model_type,
            account.id
        );
        Ok(())
    }

    async fn retrieve_current_credential(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
        storage_type: &str,
    ) -> IdentityResult<Option<CredentialStorage>> {
        let session = context.session()?;
        let mut current = self
            .credential_rows(session, account, storage_type, Some(1))
            .await?;
        Ok(current.pop())
    }

    async fn retrieve_credentials(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
        storage_type: &str,
    ) -> IdentityResult<Vec<CredentialStorage>> {
        let session = context.session()?;
        self.credential_rows(session, account, storage_type, None).await
    }

    async fn remove_credentials(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
    ) -> IdentityResult<()> {
        let session = context.session()?;
        let translator = self.translator();
        for mapper in self.registry.mappers_of_kind(RowKind::Credential) {
            for row in translator.associated_rows(session, account, mapper).await? {
                session.remove(&mapper.shape, &row).await?;
            }
        }
        Ok(())
    }
}

/// `value` placed in the context partition when it names none itself.
fn scoped_to_context<'v>(
    context: &IdentityContext<'_>,
    value: &'v AttributedType,
) -> Cow<'v, AttributedType> {
    match (value.partition(), context.partition()) {
        (None, Some(partition)) => {
            let mut scoped = value.clone();
            scoped.set(PROP_PARTITION, partition.clone());
            Cow::Owned(scoped)
        }
        _ => Cow::Borrowed(value),
    }
}

/// Column names of the relationship member rows.
struct MemberColumns {
    descriptor: String,
    reference: String,
    reference_kind: ColumnKind,
    owner: String,
}

impl MemberColumns {
    fn of(mapper: &EntityMapper) -> IdentityResult<Self> {
        let reference = bound(mapper, &ModelProperty::MemberReference)?.to_string();
        let reference_kind = mapper
            .shape
            .find_column(&reference)
            .map(|column| column.kind.clone())
            .unwrap_or(ColumnKind::Text);
        Ok(Self {
            descriptor: bound(mapper, &ModelProperty::MemberDescriptor)?.to_string(),
            reference,
            reference_kind,
            owner: owner_column(mapper)?.to_string(),
        })
    }

    async fn insert(
        &self,
        session: &dyn RelationalSession,
        mapper: &EntityMapper,
        relationship: Id,
        descriptor: &str,
        token: impl Into<Value>,
    ) -> IdentityResult<()> {
        let row = Row::new(mapper.row_type())
            .with(mapper.shape.identifier.clone(), Id::new())
            .with(self.descriptor.clone(), descriptor)
            .with(self.reference.clone(), token)
            .with(self.owner.clone(), relationship);
        session.insert(&mapper.shape, &row).await
    }
}

fn bound<'m>(mapper: &'m EntityMapper, property: &ModelProperty) -> IdentityResult<&'m str> {
    mapper.bound_column(property).ok_or_else(|| {
        IdentityError::integrity(format!("[{}] does not bind {property}", mapper.row_type()))
    })
}

fn owner_column(mapper: &EntityMapper) -> IdentityResult<&str> {
    mapper
        .owner()
        .map(|owner| owner.column.as_str())
        .ok_or_else(|| {
            IdentityError::integrity(format!("[{}] has no owner binding", mapper.row_type()))
        })
}

fn column_value(
    mapper: &EntityMapper,
    column: &str,
    value: &Value,
) -> IdentityResult<sea_orm::sea_query::Value> {
    let kind = mapper
        .shape
        .find_column(column)
        .map(|column| column.kind.clone())
        .unwrap_or(ColumnKind::Text);
    to_sea_value(&kind, column, value)
}

fn row_id(row: &Row, column: &str) -> IdentityResult<Id> {
    let text = row.get(column).as_str().ok_or_else(|| {
        IdentityError::integrity(format!("[{}] row has no value in [{column}]", row.row_type))
    })?;
    Id::parse(text)
}
