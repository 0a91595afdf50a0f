use crate::{
    AttributedType, Id, PROP_CREATED_DATE, PROP_EXPIRATION_DATE, PropertyValue, Timestamp, Value,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Direct lookup; takes precedence over every other predicate.
    Identifier(Vec<Id>),
    Partition(AttributedType),
    Equals {
        property: String,
        value: PropertyValue,
    },
    After {
        property: String,
        value: Timestamp,
    },
    Before {
        property: String,
        value: Timestamp,
    },
    /// Owner must hold every listed value under `name`.
    Attribute {
        name: String,
        values: Vec<Value>,
    },
    /// Relationship must have one of `identities` in the `role` member slot.
    Member {
        role: String,
        identities: Vec<AttributedType>,
    },
    /// Relationship must have `identity` in any member slot.
    Participant(AttributedType),
    Sort {
        property: String,
        descending: bool,
    },
}

/// Abstract query over identity types or relationships.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub target_type: String,
    pub predicates: Vec<Predicate>,
    pub limit: u32,
    pub offset: u32,
}

impl Query {
    pub fn new(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            predicates: Vec::new(),
            limit: 0,
            offset: 0,
        }
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn id(self, id: Id) -> Self {
        self.with(Predicate::Identifier(vec![id]))
    }

    pub fn partition(self, partition: AttributedType) -> Self {
        self.with(Predicate::Partition(partition))
    }

    pub fn equals(self, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(Predicate::Equals {
            property: property.into(),
            value: value.into(),
        })
    }

    pub fn created_after(self, value: Timestamp) -> Self {
        self.with(Predicate::After {
            property: PROP_CREATED_DATE.to_string(),
            value,
        })
    }

    pub fn created_before(self, value: Timestamp) -> Self {
        self.with(Predicate::Before {
            property: PROP_CREATED_DATE.to_string(),
            value,
        })
    }

    pub fn expiry_after(self, value: Timestamp) -> Self {
        self.with(Predicate::After {
            property: PROP_EXPIRATION_DATE.to_string(),
            value,
        })
    }

    pub fn expiry_before(self, value: Timestamp) -> Self {
        self.with(Predicate::Before {
            property: PROP_EXPIRATION_DATE.to_string(),
            value,
        })
    }

    pub fn attribute<I, V>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with(Predicate::Attribute {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn member(self, role: impl Into<String>, identities: Vec<AttributedType>) -> Self {
        self.with(Predicate::Member {
            role: role.into(),
            identities,
        })
    }

    pub fn participant(self, identity: AttributedType) -> Self {
        self.with(Predicate::Participant(identity))
    }

    pub fn sort_by(self, property: impl Into<String>, descending: bool) -> Self {
        self.with(Predicate::Sort {
            property: property.into(),
            descending,
        })
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn identifiers(&self) -> Option<&[Id]> {
        self.predicates.iter().find_map(|predicate| match predicate {
            Predicate::Identifier(ids) => Some(ids.as_slice()),
            _ => None,
        })
    }

    pub fn partition_filter(&self) -> Option<&AttributedType> {
        self.predicates.iter().find_map(|predicate| match predicate {
            Predicate::Partition(partition) => Some(partition),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Predicate, Query};
    use crate::{AttributedType, Id, REALM, Timestamp, USER, Value};

    #[test]
    fn builder_keeps_predicate_order() {
        let query = Query::new(USER)
            .created_after(Timestamp(10))
            .attribute("roles", ["admin", "user"])
            .limit(5)
            .offset(2);
        assert_eq!(query.predicates.len(), 2);
        assert!(matches!(query.predicates[0], Predicate::After { .. }));
        match &query.predicates[1] {
            Predicate::Attribute { name, values } => {
                assert_eq!(name, "roles");
                assert_eq!(values, &vec![Value::from("admin"), Value::from("user")]);
            }
            other => panic!("unexpected predicate {other:?}"),
        }
        assert_eq!((query.limit, query.offset), (5, 2));
    }

    #[test]
    fn identifier_and_partition_are_discoverable() {
        let id = Id::new();
        let realm = AttributedType::new(REALM);
        let query = Query::new(USER).partition(realm.clone()).id(id);
        assert_eq!(query.identifiers(), Some(&[id][..]));
        assert_eq!(query.partition_filter(), Some(&realm));
    }
}
