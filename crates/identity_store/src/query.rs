use indexmap::{IndexMap, IndexSet};
use sea_orm::sea_query::{
    Alias, Condition, Expr, ExprTrait, Func, JoinType, Order, Query as SelectQuery,
    QueryStatementWriter, SelectStatement, SqliteQueryBuilder,
};

use aideon_identity_core::{
    AttributedType, BaseKind, ColumnKind, Id, IdentityError, IdentityResult, ModelProperty,
    PROP_PARTITION, Predicate, PropertyValue, Query, RelationalSession, RelationshipReference,
    RowShape, Value, codec,
};

use crate::mapping::{EntityMapper, EntityMapperRegistry, ObjectRowTranslator, OwnerTarget};
use crate::session::{ident, to_sea_value};

const BASE_ALIAS: &str = "t0";

/// Outcome of translating a [`Query`].
#[derive(Debug)]
pub enum Translation {
    /// Fetch these identifiers directly.
    Lookup(Vec<Id>),
    Select(QueryPlan),
    /// Nothing can match, typically because a referenced row does not exist.
    Empty,
}

/// Identifier select over the root row of the target type.
#[derive(Debug)]
pub struct QueryPlan {
    pub root_row_type: String,
    /// Projection decoded from each result row.
    pub projection: RowShape,
    pub statement: SelectStatement,
}

pub struct QueryTranslator<'r> {
    registry: &'r EntityMapperRegistry,
}

impl<'r> QueryTranslator<'r> {
    pub fn new(registry: &'r EntityMapperRegistry) -> Self {
        Self { registry }
    }

    /// `default_partition` applies when the query carries no partition predicate and the
    /// target type binds a partition.
    pub async fn translate(
        &self,
        session: &dyn RelationalSession,
        query: &Query,
        default_partition: Option<&AttributedType>,
    ) -> IdentityResult<Translation> {
        if let Some(ids) = query.identifiers() {
            return Ok(Translation::Lookup(ids.to_vec()));
        }
        let target = query.target_type.as_str();
        let root = self.registry.root_mapper_for(target)?;
        let mut builder = PlanBuilder::new(self.registry, target, root);
        let translator = ObjectRowTranslator::new(self.registry);

        let explicit_partition = query.partition_filter();
        let partition = match explicit_partition {
            Some(partition) => Some((partition, true)),
            None => default_partition.map(|partition| (partition, false)),
        };
        if let Some((partition, explicit)) = partition {
            match self.registry.mapper_for_property(target, PROP_PARTITION) {
                Ok((mapper, column)) => {
                    let Some(reference) = translator.row_reference(session, partition).await?
                    else {
                        return Ok(Translation::Empty);
                    };
                    let column_ref = builder.column(mapper, column)?;
                    let value = builder.column_value(mapper, column, &reference)?;
                    builder.select.and_where(column_ref.eq(value));
                }
                Err(err) if explicit => return Err(err),
                Err(_) => {}
            }
        }

        if !BaseKind::is_queryable_base(target) {
            if let Some(column) = root
                .descriptor_for(self.registry.hierarchy(), target)
                .and_then(|descriptor| descriptor.discriminator.as_deref())
            {
                let column_ref = builder.column(root, column)?;
                builder.select.and_where(column_ref.eq(target.to_string()));
            }
        }

        for predicate in &query.predicates {
            match predicate {
                Predicate::Identifier(_) | Predicate::Partition(_) => {}
                Predicate::After { property, value } => {
                    let columns = self.property_columns(&mut builder, target, property)?;
                    builder.and_any(
                        columns
                            .into_iter()
                            .map(|(_, _, column_ref)| column_ref.gte(value.as_millis()))
                            .collect(),
                    );
                }
                Predicate::Before { property, value } => {
                    let columns = self.property_columns(&mut builder, target, property)?;
                    builder.and_any(
                        columns
                            .into_iter()
                            .map(|(_, _, column_ref)| column_ref.lte(value.as_millis()))
                            .collect(),
                    );
                }
                Predicate::Equals { property, value } => {
                    match self.property_columns(&mut builder, target, property) {
                        Ok(columns) => {
                            let compared = match value {
                                PropertyValue::Value(value) => value.clone(),
                                PropertyValue::Type(other) => {
                                    match translator.row_reference(session, other).await? {
                                        Some(reference) => reference,
                                        None => return Ok(Translation::Empty),
                                    }
                                }
                            };
                            let mut conditions = Vec::with_capacity(columns.len());
                            for (mapper, column, column_ref) in columns {
                                let compared = builder.column_value(mapper, column, &compared)?;
                                conditions.push(column_ref.eq(compared));
                            }
                            builder.and_any(conditions);
                        }
                        Err(IdentityError::NoMapperFound { .. }) => {
                            let Some(value) = value.as_value() else {
                                return Err(IdentityError::no_mapper(format!(
                                    "type [{target}] has no mapped property [{property}]"
                                )));
                            };
                            let subquery = self.attribute_subquery(
                                target,
                                property,
                                std::slice::from_ref(value),
                            )?;
                            builder.restrict_identifier(subquery);
                        }
                        Err(err) => return Err(err),
                    }
                }
                Predicate::Attribute { name, values } => {
                    let subquery = self.attribute_subquery(target, name, values)?;
                    builder.restrict_identifier(subquery);
                }
                Predicate::Member { role, identities } => {
                    self.require_relationship(target)?;
                    let mut tokens = Vec::new();
                    for identity in identities {
                        if let Some(token) = self.member_token(session, identity).await? {
                            tokens.push(token);
                        }
                    }
                    if tokens.is_empty() {
                        return Ok(Translation::Empty);
                    }
                    let subquery = self.member_subquery(Some(role), tokens)?;
                    builder.restrict_identifier(subquery);
                }
                Predicate::Participant(identity) => {
                    self.require_relationship(target)?;
                    let Some(token) = self.member_token(session, identity).await? else {
                        return Ok(Translation::Empty);
                    };
                    let subquery = self.member_subquery(None, vec![token])?;
                    builder.restrict_identifier(subquery);
                }
                Predicate::Sort {
                    property,
                    descending,
                } => {
                    let mut columns = self.property_columns(&mut builder, target, property)?;
                    if columns.len() > 1 {
                        return Err(IdentityError::invalid(format!(
                            "[{target}] binds [{property}] on several rows and cannot sort by it"
                        )));
                    }
                    let (_, _, column_ref) = columns.remove(0);
                    let order = if *descending { Order::Desc } else { Order::Asc };
                    builder.select.expr(column_ref.clone());
                    builder.select.order_by_expr(column_ref, order);
                }
            }
        }

        if query.limit > 0 {
            builder.select.limit(u64::from(query.limit));
            if query.offset > 0 {
                builder.select.offset(u64::from(query.offset));
            }
        }

        let plan = builder.finish();
        log::debug!(
            "identity query for [{target}]: {}",
            plan.statement.to_string(SqliteQueryBuilder)
        );
        Ok(Translation::Select(plan))
    }

    /// Reference a relationship member row holds for `identity`.
    pub async fn member_token(
        &self,
        session: &dyn RelationalSession,
        identity: &AttributedType,
    ) -> IdentityResult<Option<Value>> {
        let member = self.registry.relationship_member_mapper()?;
        let column = member_column(member, &ModelProperty::MemberReference)?;
        match member.shape.find_column(column).map(|column| &column.kind) {
            Some(ColumnKind::Reference(_)) => {
                ObjectRowTranslator::new(self.registry)
                    .row_reference(session, identity)
                    .await
            }
            _ => Ok(Some(Value::from(RelationshipReference::format_id(identity)))),
        }
    }

    /// Owners holding every value in `values` under `name`. Values are compared in their
    /// encoded form and each must be matched by a distinct row.
    fn attribute_subquery(
        &self,
        target: &str,
        name: &str,
        values: &[Value],
    ) -> IdentityResult<SelectStatement> {
        let mapper = self.registry.attribute_mapper_for(target)?;
        let name_column = member_column(mapper, &ModelProperty::AttributeName)?;
        let value_column = member_column(mapper, &ModelProperty::AttributeValue)?;
        let owner_column = owner_column(mapper)?;

        let mut encoded = IndexSet::new();
        for value in values {
            for scalar in codec::storage_values(value) {
                encoded.insert(codec::encode(scalar)?);
            }
        }

        let mut subquery = SelectQuery::select();
        subquery
            .column(ident(owner_column))
            .from(ident(mapper.row_type()))
            .and_where(Expr::col(ident(name_column)).eq(name.to_string()))
            .group_by_col(ident(owner_column));
        if !encoded.is_empty() {
            let count = encoded.len() as i64;
            subquery
                .and_where(Expr::col(ident(value_column)).is_in(encoded))
                .and_having(
                    Expr::expr(Func::count_distinct(Expr::col(ident(value_column)))).eq(count),
                );
        }
        Ok(subquery.to_owned())
    }

    /// Relationships with a member row matching one of `tokens`, optionally in `role`.
    fn member_subquery(
        &self,
        role: Option<&str>,
        tokens: Vec<Value>,
    ) -> IdentityResult<SelectStatement> {
        let mapper = self.registry.relationship_member_mapper()?;
        let descriptor_column = member_column(mapper, &ModelProperty::MemberDescriptor)?;
        let reference_column = member_column(mapper, &ModelProperty::MemberReference)?;
        let owner_column = owner_column(mapper)?;
        let reference_kind = mapper
            .shape
            .find_column(reference_column)
            .map(|column| column.kind.clone())
            .unwrap_or(ColumnKind::Text);
        let tokens = tokens
            .iter()
            .map(|token| to_sea_value(&reference_kind, reference_column, token))
            .collect::<IdentityResult<Vec<_>>>()?;

        let mut subquery = SelectQuery::select();
        subquery
            .column(ident(owner_column))
            .from(ident(mapper.row_type()))
            .and_where(Expr::col(ident(reference_column)).is_in(tokens));
        if let Some(role) = role {
            subquery.and_where(Expr::col(ident(descriptor_column)).eq(role.to_string()));
        }
        Ok(subquery.to_owned())
    }

    /// Column references holding `property`. A universal base bound on several subtype
    /// rows left-joins each of them and the caller matches any one.
    fn property_columns(
        &self,
        builder: &mut PlanBuilder<'r>,
        target: &str,
        property: &str,
    ) -> IdentityResult<Vec<(&'r EntityMapper, &'r str, Expr)>> {
        let bindings = self.registry.property_bindings(target, property)?;
        if bindings.len() == 1 || !BaseKind::is_queryable_base(target) {
            let (mapper, column) = bindings[0];
            let column_ref = builder.column(mapper, column)?;
            return Ok(vec![(mapper, column, column_ref)]);
        }
        let mut columns = Vec::with_capacity(bindings.len());
        for (mapper, column) in bindings {
            let column_ref = builder.optional_column(mapper, column)?;
            columns.push((mapper, column, column_ref));
        }
        Ok(columns)
    }

    fn require_relationship(&self, target: &str) -> IdentityResult<()> {
        match self.registry.hierarchy().base_kind(target) {
            Some(BaseKind::Relationship) => Ok(()),
            _ => Err(IdentityError::invalid(format!(
                "membership predicates only apply to relationships, not [{target}]"
            ))),
        }
    }
}

struct PlanBuilder<'r> {
    registry: &'r EntityMapperRegistry,
    target: String,
    root: &'r EntityMapper,
    select: SelectStatement,
    aliases: IndexMap<String, Alias>,
}

impl<'r> PlanBuilder<'r> {
    fn new(registry: &'r EntityMapperRegistry, target: &str, root: &'r EntityMapper) -> Self {
        let mut select = SelectQuery::select();
        select
            .distinct()
            .column((ident(BASE_ALIAS), ident(&root.shape.identifier)))
            .from_as(ident(root.row_type()), ident(BASE_ALIAS));
        let mut aliases = IndexMap::new();
        aliases.insert(root.row_type().to_string(), ident(BASE_ALIAS));
        Self {
            registry,
            target: target.to_string(),
            root,
            select,
            aliases,
        }
    }

    /// Column reference on the base row, joining `mapper`'s row in first when needed.
    fn column(&mut self, mapper: &EntityMapper, column: &str) -> IdentityResult<Expr> {
        let alias = self.alias_for(mapper.row_type(), JoinType::InnerJoin)?;
        Ok(Expr::col((alias, ident(column))))
    }

    /// Like [`Self::column`] but keeps base rows that have no row of `mapper`.
    fn optional_column(&mut self, mapper: &EntityMapper, column: &str) -> IdentityResult<Expr> {
        let alias = self.alias_for(mapper.row_type(), JoinType::LeftJoin)?;
        Ok(Expr::col((alias, ident(column))))
    }

    /// Adds a condition satisfied when any of `conditions` holds.
    fn and_any(&mut self, mut conditions: Vec<Expr>) {
        if conditions.len() == 1 {
            self.select.and_where(conditions.remove(0));
            return;
        }
        let any = conditions
            .into_iter()
            .fold(Condition::any(), |any, condition| any.add(condition));
        self.select.cond_where(any);
    }

    fn column_value(
        &self,
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

    fn alias_for(&mut self, row_type: &str, join: JoinType) -> IdentityResult<Alias> {
        if let Some(alias) = self.aliases.get(row_type) {
            return Ok(alias.clone());
        }
        let mapper = self.registry.mapper_for_row_type(row_type)?;
        let owner = mapper.owner().ok_or_else(|| {
            IdentityError::integrity(format!(
                "[{row_type}] cannot be joined to [{}] without an owner binding",
                self.root.row_type()
            ))
        })?;
        let parent_row = match &owner.target {
            OwnerTarget::Row(parent_row) => parent_row.clone(),
            OwnerTarget::Identifier => self.root.row_type().to_string(),
        };
        let parent_alias = self.alias_for(&parent_row, join)?;
        let parent = self.registry.mapper_for_row_type(&parent_row)?;
        let alias_name = format!("t{}", self.aliases.len());
        log::debug!("joining [{row_type}] as {alias_name} for [{}]", self.target);
        let alias = ident(&alias_name);
        self.select.join_as(
            join,
            ident(row_type),
            alias.clone(),
            Expr::col((alias.clone(), ident(&owner.column)))
                .equals((parent_alias, ident(&parent.shape.identifier))),
        );
        self.aliases.insert(row_type.to_string(), alias.clone());
        Ok(alias)
    }

    fn restrict_identifier(&mut self, subquery: SelectStatement) {
        let identifier = Expr::col((ident(BASE_ALIAS), ident(&self.root.shape.identifier)));
        self.select.and_where(identifier.in_subquery(subquery));
    }

    fn finish(self) -> QueryPlan {
        QueryPlan {
            root_row_type: self.root.row_type().to_string(),
            projection: RowShape::new(self.root.row_type(), self.root.shape.identifier.clone()),
            statement: self.select,
        }
    }
}

fn member_column<'m>(
    mapper: &'m EntityMapper,
    property: &ModelProperty,
) -> IdentityResult<&'m str> {
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

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sea_orm::sea_query::{QueryStatementWriter, SelectStatement, SqliteQueryBuilder};

    use super::{QueryTranslator, Translation};
    use crate::default_mapping::{PROP_LOGIN_NAME, default_registry};
    use aideon_identity_core::{
        AttributedType, GRANT, IDENTITY_TYPE, Id, IdentityError, IdentityResult, Query,
        REALM, ROLE, RelationalSession, Row, RowShape, Timestamp, USER, Value,
    };

    /// Session that knows about a fixed set of root rows and records nothing else.
    #[derive(Default)]
    struct KnownRows {
        ids: Mutex<Vec<Id>>,
    }

    impl KnownRows {
        fn with(ids: &[Id]) -> Self {
            Self {
                ids: Mutex::new(ids.to_vec()),
            }
        }
    }

    #[async_trait]
    impl RelationalSession for KnownRows {
        async fn find(&self, shape: &RowShape, identifier: &Value) -> IdentityResult<Option<Row>> {
            let known = self.ids.lock().expect("lock");
            let found = known
                .iter()
                .any(|id| identifier.as_str() == Some(id.to_string().as_str()));
            Ok(found.then(|| {
                Row::new(shape.row_type.clone())
                    .with(shape.identifier.clone(), identifier.clone())
            }))
        }

        async fn insert(&self, _: &RowShape, _: &Row) -> IdentityResult<()> {
            Ok(())
        }

        async fn merge(&self, _: &RowShape, _: &Row) -> IdentityResult<()> {
            Ok(())
        }

        async fn remove(&self, _: &RowShape, _: &Row) -> IdentityResult<()> {
            Ok(())
        }

        async fn execute(&self, _: &RowShape, _: &SelectStatement) -> IdentityResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn flush(&self) -> IdentityResult<()> {
            Ok(())
        }
    }

    async fn sql_for(session: &KnownRows, query: Query) -> String {
        let registry = default_registry().expect("registry");
        let translation = QueryTranslator::new(&registry)
            .translate(session, &query, None)
            .await
            .expect("translate");
        match translation {
            Translation::Select(plan) => plan.statement.to_string(SqliteQueryBuilder),
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn identifier_predicate_short_circuits() {
        let registry = default_registry().expect("registry");
        let id = Id::new();
        let query = Query::new(USER).attribute("roles", ["admin"]).id(id);
        let translation = QueryTranslator::new(&registry)
            .translate(&KnownRows::default(), &query, None)
            .await
            .expect("translate");
        assert!(matches!(translation, Translation::Lookup(ids) if ids == vec![id]));
    }

    #[tokio::test]
    async fn concrete_type_adds_discriminator_and_joins_account_row() {
        let sql = sql_for(
            &KnownRows::default(),
            Query::new(USER).equals(PROP_LOGIN_NAME, "alice"),
        )
        .await;
        assert!(sql.starts_with(
            "SELECT DISTINCT \"t0\".\"id\" FROM \"idm_identity_type\" AS \"t0\""
        ));
        assert!(sql.contains(
            "INNER JOIN \"idm_account\" AS \"t1\" ON \"t1\".\"id\" = \"t0\".\"id\""
        ));
        assert!(sql.contains("\"t0\".\"type_name\" = 'User'"));
        assert!(sql.contains("\"t1\".\"login_name\" = 'alice'"));
    }

    #[tokio::test]
    async fn base_type_has_no_discriminator() {
        let sql = sql_for(&KnownRows::default(), Query::new(IDENTITY_TYPE)).await;
        assert!(!sql.contains("type_name"));
    }

    #[tokio::test]
    async fn attribute_predicate_groups_and_counts_distinct_values() {
        let sql = sql_for(
            &KnownRows::default(),
            Query::new(USER).attribute("roles", ["admin", "user", "admin"]),
        )
        .await;
        assert!(sql.contains(
            "\"t0\".\"id\" IN (SELECT \"owner_id\" FROM \"idm_identity_attribute\""
        ));
        assert!(sql.contains("GROUP BY \"owner_id\""));
        assert!(sql.contains("HAVING COUNT(DISTINCT \"value\") = 2"));
    }

    #[tokio::test]
    async fn range_predicates_and_pagination() {
        let sql = sql_for(
            &KnownRows::default(),
            Query::new(ROLE)
                .created_after(Timestamp(10))
                .created_before(Timestamp(20))
                .limit(5)
                .offset(10),
        )
        .await;
        assert!(sql.contains("\"t0\".\"created_date\" >= 10"));
        assert!(sql.contains("\"t0\".\"created_date\" <= 20"));
        assert!(sql.ends_with("LIMIT 5 OFFSET 10"));

        let sql = sql_for(&KnownRows::default(), Query::new(ROLE).offset(10)).await;
        assert!(!sql.contains("OFFSET"));
    }

    #[tokio::test]
    async fn missing_partition_row_matches_nothing() {
        let registry = default_registry().expect("registry");
        let query = Query::new(USER).partition(AttributedType::new(REALM));
        let translation = QueryTranslator::new(&registry)
            .translate(&KnownRows::default(), &query, None)
            .await
            .expect("translate");
        assert!(matches!(translation, Translation::Empty));
    }

    #[tokio::test]
    async fn member_predicate_uses_member_subquery() {
        let user = AttributedType::new(USER);
        let session = KnownRows::with(&[user.id]);
        let sql = sql_for(&session, Query::new(GRANT).member("assignee", vec![user.clone()])).await;
        assert!(sql.contains("IN (SELECT \"owner_id\" FROM \"idm_relationship_identity\""));
        assert!(sql.contains(&format!("\"identity_id\" IN ('{}')", user.id)));
        assert!(sql.contains("\"descriptor\" = 'assignee'"));
    }

    #[tokio::test]
    async fn membership_predicates_reject_identity_targets() {
        let registry = default_registry().expect("registry");
        let query = Query::new(USER).participant(AttributedType::new(ROLE));
        let err = QueryTranslator::new(&registry)
            .translate(&KnownRows::default(), &query, None)
            .await
            .expect_err("participant on identity");
        assert!(matches!(err, IdentityError::Validation { .. }));
    }

    #[tokio::test]
    async fn base_type_matches_property_on_any_subtype_row() {
        let sql = sql_for(
            &KnownRows::default(),
            Query::new(IDENTITY_TYPE).equals("name", "staff"),
        )
        .await;
        assert!(sql.contains("LEFT JOIN \"idm_role\""));
        assert!(sql.contains("LEFT JOIN \"idm_group\""));
        assert!(!sql.contains("INNER JOIN"));
        assert!(sql.contains(" OR "));

        let registry = default_registry().expect("registry");
        let err = QueryTranslator::new(&registry)
            .translate(
                &KnownRows::default(),
                &Query::new(IDENTITY_TYPE).sort_by("name", false),
                None,
            )
            .await
            .expect_err("ambiguous sort");
        assert!(matches!(err, IdentityError::Validation { .. }));
    }

    #[tokio::test]
    async fn unmapped_equality_falls_back_to_attribute_rows() {
        let sql = sql_for(
            &KnownRows::default(),
            Query::new(USER).equals("department", "sales"),
        )
        .await;
        assert!(sql.contains("\"idm_identity_attribute\""));
        assert!(sql.contains("\"name\" = 'department'"));
    }
}
