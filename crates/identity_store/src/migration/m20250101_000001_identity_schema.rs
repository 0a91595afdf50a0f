use sea_orm_migration::prelude::*;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IdmPartition::Table)
                    .if_not_exists()
                    .col(id_col(IdmPartition::Id, false).primary_key())
                    .col(ColumnDef::new(IdmPartition::TypeName).string().not_null())
                    .col(ColumnDef::new(IdmPartition::Name).string().not_null())
                    .col(ColumnDef::new(IdmPartition::ConfigurationName).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmIdentityType::Table)
                    .if_not_exists()
                    .col(id_col(IdmIdentityType::Id, false).primary_key())
                    .col(ColumnDef::new(IdmIdentityType::TypeName).string().not_null())
                    .col(id_col(IdmIdentityType::PartitionId, true))
                    .col(ColumnDef::new(IdmIdentityType::CreatedDate).big_integer())
                    .col(ColumnDef::new(IdmIdentityType::ExpirationDate).big_integer())
                    .col(ColumnDef::new(IdmIdentityType::Enabled).boolean())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmAccount::Table)
                    .if_not_exists()
                    .col(id_col(IdmAccount::Id, false).primary_key())
                    .col(ColumnDef::new(IdmAccount::LoginName).string())
                    .col(ColumnDef::new(IdmAccount::FirstName).string())
                    .col(ColumnDef::new(IdmAccount::LastName).string())
                    .col(ColumnDef::new(IdmAccount::Email).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmRole::Table)
                    .if_not_exists()
                    .col(id_col(IdmRole::Id, false).primary_key())
                    .col(ColumnDef::new(IdmRole::Name).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmGroup::Table)
                    .if_not_exists()
                    .col(id_col(IdmGroup::Id, false).primary_key())
                    .col(ColumnDef::new(IdmGroup::Name).string())
                    .col(ColumnDef::new(IdmGroup::Path).string())
                    .col(id_col(IdmGroup::ParentId, true))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmRelationship::Table)
                    .if_not_exists()
                    .col(id_col(IdmRelationship::Id, false).primary_key())
                    .col(ColumnDef::new(IdmRelationship::TypeName).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmRelationshipIdentity::Table)
                    .if_not_exists()
                    .col(id_col(IdmRelationshipIdentity::Id, false).primary_key())
                    .col(
                        ColumnDef::new(IdmRelationshipIdentity::Descriptor)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdmRelationshipIdentity::IdentityId)
                            .string()
                            .not_null(),
                    )
                    .col(id_col(IdmRelationshipIdentity::OwnerId, false))
                    .to_owned(),
            )
            .await?;

        for (table, id, name, value, owner) in [
            (
                IdmIdentityAttribute::Table.into_iden(),
                IdmIdentityAttribute::Id.into_iden(),
                IdmIdentityAttribute::Name.into_iden(),
                IdmIdentityAttribute::Value.into_iden(),
                IdmIdentityAttribute::OwnerId.into_iden(),
            ),
            (
                IdmAttribute::Table.into_iden(),
                IdmAttribute::Id.into_iden(),
                IdmAttribute::Name.into_iden(),
                IdmAttribute::Value.into_iden(),
                IdmAttribute::OwnerId.into_iden(),
            ),
        ] {
            manager
                .create_table(
                    Table::create()
                        .table(table)
                        .if_not_exists()
                        .col(id_col(id, false).primary_key())
                        .col(ColumnDef::new(name).string().not_null())
                        .col(ColumnDef::new(value).text().not_null())
                        .col(id_col(owner, false))
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(IdmPasswordCredential::Table)
                    .if_not_exists()
                    .col(id_col(IdmPasswordCredential::Id, false).primary_key())
                    .col(id_col(IdmPasswordCredential::OwnerId, false))
                    .col(
                        ColumnDef::new(IdmPasswordCredential::TypeName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdmPasswordCredential::EffectiveDate)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdmPasswordCredential::ExpiryDate).big_integer())
                    .col(ColumnDef::new(IdmPasswordCredential::EncodedHash).text())
                    .col(ColumnDef::new(IdmPasswordCredential::Salt).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmOtpCredential::Table)
                    .if_not_exists()
                    .col(id_col(IdmOtpCredential::Id, false).primary_key())
                    .col(id_col(IdmOtpCredential::OwnerId, false))
                    .col(ColumnDef::new(IdmOtpCredential::TypeName).string().not_null())
                    .col(
                        ColumnDef::new(IdmOtpCredential::EffectiveDate)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdmOtpCredential::ExpiryDate).big_integer())
                    .col(ColumnDef::new(IdmOtpCredential::SecretKey).text())
                    .col(ColumnDef::new(IdmOtpCredential::Device).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdmDigestCredential::Table)
                    .if_not_exists()
                    .col(id_col(IdmDigestCredential::Id, false).primary_key())
                    .col(id_col(IdmDigestCredential::OwnerId, false))
                    .col(
                        ColumnDef::new(IdmDigestCredential::TypeName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdmDigestCredential::EffectiveDate)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdmDigestCredential::ExpiryDate).big_integer())
                    .col(ColumnDef::new(IdmDigestCredential::Ha1).text())
                    .col(ColumnDef::new(IdmDigestCredential::Realm).string())
                    .to_owned(),
            )
            .await?;

        create_indexes(manager).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            IdmDigestCredential::Table.into_iden(),
            IdmOtpCredential::Table.into_iden(),
            IdmPasswordCredential::Table.into_iden(),
            IdmAttribute::Table.into_iden(),
            IdmIdentityAttribute::Table.into_iden(),
            IdmRelationshipIdentity::Table.into_iden(),
            IdmRelationship::Table.into_iden(),
            IdmGroup::Table.into_iden(),
            IdmRole::Table.into_iden(),
            IdmAccount::Table.into_iden(),
            IdmIdentityType::Table.into_iden(),
            IdmPartition::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

async fn create_indexes(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .name("idm_partition_type_name_idx")
                .table(IdmPartition::Table)
                .col(IdmPartition::TypeName)
                .col(IdmPartition::Name)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("idm_identity_type_partition_idx")
                .table(IdmIdentityType::Table)
                .col(IdmIdentityType::PartitionId)
                .col(IdmIdentityType::TypeName)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("idm_relationship_identity_owner_idx")
                .table(IdmRelationshipIdentity::Table)
                .col(IdmRelationshipIdentity::OwnerId)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("idm_relationship_identity_member_idx")
                .table(IdmRelationshipIdentity::Table)
                .col(IdmRelationshipIdentity::IdentityId)
                .col(IdmRelationshipIdentity::Descriptor)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("idm_identity_attribute_owner_idx")
                .table(IdmIdentityAttribute::Table)
                .col(IdmIdentityAttribute::OwnerId)
                .col(IdmIdentityAttribute::Name)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("idm_attribute_owner_idx")
                .table(IdmAttribute::Table)
                .col(IdmAttribute::OwnerId)
                .col(IdmAttribute::Name)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("idm_password_credential_owner_idx")
                .table(IdmPasswordCredential::Table)
                .col(IdmPasswordCredential::OwnerId)
                .col(IdmPasswordCredential::EffectiveDate)
                .if_not_exists()
                .to_owned(),
        )
        .await?;
    Ok(())
}

/// Ids are stored as hyphenated uuid text on every backend.
fn id_col(col: impl IntoIden, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    col_def.string_len(36);
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def.to_owned()
}
