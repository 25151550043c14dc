pub(crate) mod bitvector;
pub(crate) mod cancel;
pub(crate) mod ordinal;
pub(crate) mod worklist;
