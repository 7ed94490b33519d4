//! Task authorization.
//!
//! Every task of a sync request is checked by an [`Authorizer`] before it is
//! executed. Authorizers compose with `All` and `Any` and can be built from a
//! serializable [`Right`] description.

mod authorizer;
mod rights;

pub use authorizer::{
    Authorizer, ContainerAccess, NameMatcher, SubscribeChangesAccess, TaskPredicate,
};
pub use rights::Right;
