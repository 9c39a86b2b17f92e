pub(crate) mod links;
pub(crate) mod meta;
pub(crate) mod repo;
pub(crate) mod shared;
pub(crate) mod show;
pub(crate) mod sources;
pub(crate) mod sync;
