use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum IdmPartition {
    Table,
    Id,
    TypeName,
    Name,
    ConfigurationName,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmIdentityType {
    Table,
    Id,
    TypeName,
    PartitionId,
    CreatedDate,
    ExpirationDate,
    Enabled,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmAccount {
    Table,
    Id,
    LoginName,
    FirstName,
    LastName,
    Email,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmRole {
    Table,
    Id,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmGroup {
    Table,
    Id,
    Name,
    Path,
    ParentId,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmRelationship {
    Table,
    Id,
    TypeName,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmRelationshipIdentity {
    Table,
    Id,
    Descriptor,
    IdentityId,
    OwnerId,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmIdentityAttribute {
    Table,
    Id,
    Name,
    Value,
    OwnerId,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmAttribute {
    Table,
    Id,
    Name,
    Value,
    OwnerId,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmPasswordCredential {
    Table,
    Id,
    OwnerId,
    TypeName,
    EffectiveDate,
    ExpiryDate,
    EncodedHash,
    Salt,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmOtpCredential {
    Table,
    Id,
    OwnerId,
    TypeName,
    EffectiveDate,
    ExpiryDate,
    SecretKey,
    Device,
}

#[derive(Iden, Clone, Copy)]
pub enum IdmDigestCredential {
    Table,
    Id,
    OwnerId,
    TypeName,
    EffectiveDate,
    ExpiryDate,
    Ha1,
    Realm,
}

pub fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}
