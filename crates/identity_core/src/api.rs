use async_trait::async_trait;

use crate::{
    Attribute, AttributedType, CredentialStorage, Id, IdentityContext, IdentityResult, Query,
};

#[async_trait]
pub trait IdentityStoreApi {
    /// Persists identity types and relationships, including relationship member rows.
    async fn add(&self, context: &IdentityContext<'_>, value: &AttributedType)
    -> IdentityResult<()>;
    async fn update(
        &self,
        context: &IdentityContext<'_>,
        value: &AttributedType,
    ) -> IdentityResult<()>;
    /// Removes the instance and everything it owns, children first.
    async fn remove(
        &self,
        context: &IdentityContext<'_>,
        value: &AttributedType,
    ) -> IdentityResult<()>;
    async fn lookup_identity_by_id(
        &self,
        context: &IdentityContext<'_>,
        model_type: &str,
        id: Id,
    ) -> IdentityResult<Option<AttributedType>>;
    async fn fetch_identities(
        &self,
        context: &IdentityContext<'_>,
        query: &Query,
    ) -> IdentityResult<Vec<AttributedType>>;
    async fn count_identities(
        &self,
        context: &IdentityContext<'_>,
        query: &Query,
    ) -> IdentityResult<usize>;
    async fn fetch_relationships(
        &self,
        context: &IdentityContext<'_>,
        query: &Query,
    ) -> IdentityResult<Vec<AttributedType>>;
}

#[async_trait]
pub trait PartitionStoreApi {
    async fn add_partition(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
        configuration_name: &str,
    ) -> IdentityResult<()>;
    async fn update_partition(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
    ) -> IdentityResult<()>;
    async fn remove_partition(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
    ) -> IdentityResult<()>;
    async fn configuration_name(
        &self,
        context: &IdentityContext<'_>,
        partition: &AttributedType,
    ) -> IdentityResult<String>;
    /// `None` when nothing matches; `AmbiguousResult` when more than one row does.
    async fn lookup_partition(
        &self,
        context: &IdentityContext<'_>,
        partition_type: &str,
        name: &str,
    ) -> IdentityResult<Option<AttributedType>>;
    async fn list_partitions(
        &self,
        context: &IdentityContext<'_>,
        partition_type: &str,
    ) -> IdentityResult<Vec<AttributedType>>;
    async fn lookup_partition_by_id(
        &self,
        context: &IdentityContext<'_>,
        partition_type: &str,
        id: Id,
    ) -> IdentityResult<Option<AttributedType>>;
}

#[async_trait]
pub trait AttributeStoreApi {
    async fn get_attribute(
        &self,
        context: &IdentityContext<'_>,
        owner: &AttributedType,
        name: &str,
    ) -> IdentityResult<Option<Attribute>>;
    async fn set_attribute(
        &self,
        context: &IdentityContext<'_>,
        owner: &AttributedType,
        attribute: &Attribute,
    ) -> IdentityResult<()>;
    async fn remove_attribute(
        &self,
        context: &IdentityContext<'_>,
        owner: &AttributedType,
        name: &str,
    ) -> IdentityResult<()>;
    /// Replaces `owner.attributes` with what is stored.
    async fn load_attributes(
        &self,
        context: &IdentityContext<'_>,
        owner: &mut AttributedType,
    ) -> IdentityResult<()>;
}

#[async_trait]
pub trait CredentialStoreApi {
    async fn store_credential(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
        storage: &CredentialStorage,
    ) -> IdentityResult<()>;
    async fn retrieve_current_credential(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
        storage_type: &str,
    ) -> IdentityResult<Option<CredentialStorage>>;
    /// Every credential already in effect, newest effective date first.
    async fn retrieve_credentials(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
        storage_type: &str,
    ) -> IdentityResult<Vec<CredentialStorage>>;
    async fn remove_credentials(
        &self,
        context: &IdentityContext<'_>,
        account: &AttributedType,
    ) -> IdentityResult<()>;
}
