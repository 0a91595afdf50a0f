mod descriptor;
mod registry;
mod translator;

pub use descriptor::{
    EntityMapper, MappingDescriptor, OwnerBinding, OwnerTarget, RowDeclaration, RowKind,
};
pub use registry::EntityMapperRegistry;
pub use translator::ObjectRowTranslator;
