//! Row declarations matching the schema installed by [`crate::migration::Migrator`].

use aideon_identity_core::{
    ACCOUNT, ATTRIBUTE, ColumnKind, DIGEST_CREDENTIAL_STORAGE,
    ENCODED_PASSWORD_STORAGE, GROUP, IDENTITY_TYPE, IdentityResult, ModelProperty,
    OTP_CREDENTIAL_STORAGE, PARTITION, PROP_CREATED_DATE, PROP_ENABLED, PROP_EXPIRATION_DATE,
    PROP_NAME, PROP_PARTITION, RELATIONSHIP, ROLE, RowShape, TypeHierarchy,
};

use crate::db::*;
use crate::mapping::{
    EntityMapperRegistry, MappingDescriptor, OwnerBinding, RowDeclaration, RowKind,
};

pub const PROP_LOGIN_NAME: &str = "loginName";
pub const PROP_FIRST_NAME: &str = "firstName";
pub const PROP_LAST_NAME: &str = "lastName";
pub const PROP_EMAIL: &str = "email";
pub const PROP_PATH: &str = "path";
pub const PROP_PARENT_GROUP: &str = "parentGroup";
pub const PROP_ENCODED_HASH: &str = "encodedHash";
pub const PROP_SALT: &str = "salt";
pub const PROP_SECRET_KEY: &str = "secretKey";
pub const PROP_DEVICE: &str = "device";
pub const PROP_HA1: &str = "ha1";
pub const PROP_REALM: &str = "realm";

pub fn default_registry() -> IdentityResult<EntityMapperRegistry> {
    EntityMapperRegistry::configure(TypeHierarchy::builtin(), default_declarations())
}

pub fn default_declarations() -> Vec<RowDeclaration> {
    let partition_row = col_name(IdmPartition::Table);
    let identity_row = col_name(IdmIdentityType::Table);
    let relationship_row = col_name(IdmRelationship::Table);

    let mut declarations = vec![
        RowDeclaration::new(
            RowShape::new(partition_row.clone(), col_name(IdmPartition::Id))
                .column(col_name(IdmPartition::TypeName), ColumnKind::Text)
                .column(col_name(IdmPartition::Name), ColumnKind::Text)
                .column(col_name(IdmPartition::ConfigurationName), ColumnKind::Text),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::root([PARTITION])
                .discriminator(col_name(IdmPartition::TypeName))
                .bind_named(PROP_NAME, col_name(IdmPartition::Name))
                .bind(
                    ModelProperty::ConfigurationName,
                    col_name(IdmPartition::ConfigurationName),
                ),
        ),
        RowDeclaration::new(
            RowShape::new(identity_row.clone(), col_name(IdmIdentityType::Id))
                .column(col_name(IdmIdentityType::TypeName), ColumnKind::Text)
                .column(
                    col_name(IdmIdentityType::PartitionId),
                    ColumnKind::Reference(partition_row.clone()),
                )
                .column(col_name(IdmIdentityType::CreatedDate), ColumnKind::Timestamp)
                .column(
                    col_name(IdmIdentityType::ExpirationDate),
                    ColumnKind::Timestamp,
                )
                .column(col_name(IdmIdentityType::Enabled), ColumnKind::Boolean),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::root([IDENTITY_TYPE])
                .discriminator(col_name(IdmIdentityType::TypeName))
                .bind_named(PROP_PARTITION, col_name(IdmIdentityType::PartitionId))
                .bind_named(PROP_CREATED_DATE, col_name(IdmIdentityType::CreatedDate))
                .bind_named(
                    PROP_EXPIRATION_DATE,
                    col_name(IdmIdentityType::ExpirationDate),
                )
                .bind_named(PROP_ENABLED, col_name(IdmIdentityType::Enabled)),
        ),
        RowDeclaration::new(
            RowShape::new(col_name(IdmAccount::Table), col_name(IdmAccount::Id))
                .column(col_name(IdmAccount::LoginName), ColumnKind::Text)
                .column(col_name(IdmAccount::FirstName), ColumnKind::Text)
                .column(col_name(IdmAccount::LastName), ColumnKind::Text)
                .column(col_name(IdmAccount::Email), ColumnKind::Text),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::secondary(
                [ACCOUNT],
                OwnerBinding::row(col_name(IdmAccount::Id), identity_row.clone()),
            )
            .bind_named(PROP_LOGIN_NAME, col_name(IdmAccount::LoginName))
            .bind_named(PROP_FIRST_NAME, col_name(IdmAccount::FirstName))
            .bind_named(PROP_LAST_NAME, col_name(IdmAccount::LastName))
            .bind_named(PROP_EMAIL, col_name(IdmAccount::Email)),
        ),
        RowDeclaration::new(
            RowShape::new(col_name(IdmRole::Table), col_name(IdmRole::Id))
                .column(col_name(IdmRole::Name), ColumnKind::Text),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::secondary(
                [ROLE],
                OwnerBinding::row(col_name(IdmRole::Id), identity_row.clone()),
            )
            .bind_named(PROP_NAME, col_name(IdmRole::Name)),
        ),
        RowDeclaration::new(
            RowShape::new(col_name(IdmGroup::Table), col_name(IdmGroup::Id))
                .column(col_name(IdmGroup::Name), ColumnKind::Text)
                .column(col_name(IdmGroup::Path), ColumnKind::Text)
                .column(
                    col_name(IdmGroup::ParentId),
                    ColumnKind::Reference(identity_row.clone()),
                ),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::secondary(
                [GROUP],
                OwnerBinding::row(col_name(IdmGroup::Id), identity_row.clone()),
            )
            .bind_named(PROP_NAME, col_name(IdmGroup::Name))
            .bind_named(PROP_PATH, col_name(IdmGroup::Path))
            .bind_named(PROP_PARENT_GROUP, col_name(IdmGroup::ParentId)),
        ),
        RowDeclaration::new(
            RowShape::new(relationship_row.clone(), col_name(IdmRelationship::Id))
                .column(col_name(IdmRelationship::TypeName), ColumnKind::Text),
            RowKind::Managed,
        )
        .describe(
            MappingDescriptor::root([RELATIONSHIP])
                .discriminator(col_name(IdmRelationship::TypeName)),
        ),
        RowDeclaration::new(
            RowShape::new(
                col_name(IdmRelationshipIdentity::Table),
                col_name(IdmRelationshipIdentity::Id),
            )
            .column(col_name(IdmRelationshipIdentity::Descriptor), ColumnKind::Text)
            .column(
                col_name(IdmRelationshipIdentity::IdentityId),
                ColumnKind::Reference(identity_row.clone()),
            )
            .column(
                col_name(IdmRelationshipIdentity::OwnerId),
                ColumnKind::Reference(relationship_row.clone()),
            ),
            RowKind::RelationshipMember,
        )
        .describe(
            MappingDescriptor::secondary(
                [RELATIONSHIP],
                OwnerBinding::row(
                    col_name(IdmRelationshipIdentity::OwnerId),
                    relationship_row.clone(),
                ),
            )
            .bind(
                ModelProperty::MemberDescriptor,
                col_name(IdmRelationshipIdentity::Descriptor),
            )
            .bind(
                ModelProperty::MemberReference,
                col_name(IdmRelationshipIdentity::IdentityId),
            ),
        ),
        attribute_declaration(
            RowShape::new(
                col_name(IdmIdentityAttribute::Table),
                col_name(IdmIdentityAttribute::Id),
            )
            .column(col_name(IdmIdentityAttribute::Name), ColumnKind::Text)
            .column(col_name(IdmIdentityAttribute::Value), ColumnKind::Text)
            .column(
                col_name(IdmIdentityAttribute::OwnerId),
                ColumnKind::Reference(identity_row.clone()),
            ),
            OwnerBinding::row(col_name(IdmIdentityAttribute::OwnerId), identity_row.clone()),
        ),
        attribute_declaration(
            RowShape::new(col_name(IdmAttribute::Table), col_name(IdmAttribute::Id))
                .column(col_name(IdmAttribute::Name), ColumnKind::Text)
                .column(col_name(IdmAttribute::Value), ColumnKind::Text)
                .column(col_name(IdmAttribute::OwnerId), ColumnKind::Text),
            OwnerBinding::identifier(col_name(IdmAttribute::OwnerId)),
        ),
    ];

    declarations.push(credential_declaration(
        RowShape::new(
            col_name(IdmPasswordCredential::Table),
            col_name(IdmPasswordCredential::Id),
        )
        .column(
            col_name(IdmPasswordCredential::OwnerId),
            ColumnKind::Reference(identity_row.clone()),
        )
        .column(col_name(IdmPasswordCredential::TypeName), ColumnKind::Text)
        .column(
            col_name(IdmPasswordCredential::EffectiveDate),
            ColumnKind::Timestamp,
        )
        .column(
            col_name(IdmPasswordCredential::ExpiryDate),
            ColumnKind::Timestamp,
        )
        .column(col_name(IdmPasswordCredential::EncodedHash), ColumnKind::Text)
        .column(col_name(IdmPasswordCredential::Salt), ColumnKind::Text),
        ENCODED_PASSWORD_STORAGE,
        &identity_row,
        &[
            (PROP_ENCODED_HASH, col_name(IdmPasswordCredential::EncodedHash)),
            (PROP_SALT, col_name(IdmPasswordCredential::Salt)),
        ],
    ));
    declarations.push(credential_declaration(
        RowShape::new(
            col_name(IdmOtpCredential::Table),
            col_name(IdmOtpCredential::Id),
        )
        .column(
            col_name(IdmOtpCredential::OwnerId),
            ColumnKind::Reference(identity_row.clone()),
        )
        .column(col_name(IdmOtpCredential::TypeName), ColumnKind::Text)
        .column(col_name(IdmOtpCredential::EffectiveDate), ColumnKind::Timestamp)
        .column(col_name(IdmOtpCredential::ExpiryDate), ColumnKind::Timestamp)
        .column(col_name(IdmOtpCredential::SecretKey), ColumnKind::Text)
        .column(col_name(IdmOtpCredential::Device), ColumnKind::Text),
        OTP_CREDENTIAL_STORAGE,
        &identity_row,
        &[
            (PROP_SECRET_KEY, col_name(IdmOtpCredential::SecretKey)),
            (PROP_DEVICE, col_name(IdmOtpCredential::Device)),
        ],
    ));
    declarations.push(credential_declaration(
        RowShape::new(
            col_name(IdmDigestCredential::Table),
            col_name(IdmDigestCredential::Id),
        )
        .column(
            col_name(IdmDigestCredential::OwnerId),
            ColumnKind::Reference(identity_row.clone()),
        )
        .column(col_name(IdmDigestCredential::TypeName), ColumnKind::Text)
        .column(
            col_name(IdmDigestCredential::EffectiveDate),
            ColumnKind::Timestamp,
        )
        .column(
            col_name(IdmDigestCredential::ExpiryDate),
            ColumnKind::Timestamp,
        )
        .column(col_name(IdmDigestCredential::Ha1), ColumnKind::Text)
        .column(col_name(IdmDigestCredential::Realm), ColumnKind::Text),
        DIGEST_CREDENTIAL_STORAGE,
        &identity_row,
        &[
            (PROP_HA1, col_name(IdmDigestCredential::Ha1)),
            (PROP_REALM, col_name(IdmDigestCredential::Realm)),
        ],
    ));
    declarations
}

/// Attribute tables share their column names.
fn attribute_declaration(shape: RowShape, owner: OwnerBinding) -> RowDeclaration {
    let name = col_name(IdmAttribute::Name);
    let value = col_name(IdmAttribute::Value);
    RowDeclaration::new(shape, RowKind::Attribute).describe(
        MappingDescriptor::secondary([ATTRIBUTE], owner)
            .bind(ModelProperty::AttributeName, name)
            .bind(ModelProperty::AttributeValue, value),
    )
}

fn credential_declaration(
    shape: RowShape,
    storage_type: &str,
    owner_row: &str,
    fields: &[(&str, String)],
) -> RowDeclaration {
    // Credential tables share their bookkeeping column names.
    let owner_column = col_name(IdmPasswordCredential::OwnerId);
    let mut descriptor = MappingDescriptor::secondary(
        [storage_type],
        OwnerBinding::row(owner_column, owner_row),
    )
    .discriminator(col_name(IdmPasswordCredential::TypeName))
    .bind(
        ModelProperty::EffectiveDate,
        col_name(IdmPasswordCredential::EffectiveDate),
    )
    .bind(
        ModelProperty::ExpiryDate,
        col_name(IdmPasswordCredential::ExpiryDate),
    );
    for (property, column) in fields {
        descriptor = descriptor.bind_named(property, column.clone());
    }
    RowDeclaration::new(shape, RowKind::Credential).describe(descriptor)
}

#[cfg(test)]
mod tests {
    use super::{default_declarations, default_registry};
    use crate::mapping::RowKind;
    use aideon_identity_core::{
        ENCODED_PASSWORD_STORAGE, GRANT, IDENTITY_TYPE, OTP_CREDENTIAL_STORAGE, REALM, ROLE, USER,
    };

    #[test]
    fn default_mapping_configures() {
        let registry = default_registry().expect("registry");
        assert_eq!(registry.mappers().len(), default_declarations().len());
        assert_eq!(registry.mappers()[0].row_type(), "idm_partition");
    }

    #[test]
    fn every_builtin_type_has_its_root_first() {
        let registry = default_registry().expect("registry");
        for (model_type, root) in [
            (REALM, "idm_partition"),
            (USER, "idm_identity_type"),
            (ROLE, "idm_identity_type"),
            (IDENTITY_TYPE, "idm_identity_type"),
            (GRANT, "idm_relationship"),
        ] {
            let mappers = registry.mappers_for(model_type).expect("mappers");
            assert_eq!(mappers[0].row_type(), root, "{model_type}");
            assert!(mappers.iter().all(|mapper| mapper.kind == RowKind::Managed));
        }
        let user_rows = registry
            .mappers_for(USER)
            .expect("user")
            .iter()
            .map(|mapper| mapper.row_type().to_string())
            .collect::<Vec<_>>();
        assert_eq!(user_rows, vec!["idm_identity_type", "idm_account"]);
    }

    #[test]
    fn attribute_and_credential_rows_follow_ownership() {
        let registry = default_registry().expect("registry");
        assert_eq!(
            registry.attribute_mapper_for(USER).expect("user").row_type(),
            "idm_identity_attribute"
        );
        assert_eq!(
            registry.attribute_mapper_for(REALM).expect("realm").row_type(),
            "idm_attribute"
        );
        assert_eq!(
            registry.attribute_mapper_for(GRANT).expect("grant").row_type(),
            "idm_attribute"
        );
        assert_eq!(
            registry
                .credential_mapper_for(ENCODED_PASSWORD_STORAGE, USER)
                .expect("password")
                .row_type(),
            "idm_password_credential"
        );
        assert_eq!(
            registry
                .credential_mapper_for(OTP_CREDENTIAL_STORAGE, USER)
                .expect("otp")
                .row_type(),
            "idm_otp_credential"
        );
    }
}
